use eframe::egui;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

mod modals;
mod state;
mod tray;
mod types;
mod utils;

use modals::MessageBox;
use tray::{close_action, CloseAction, APP_TITLE};
use types::AppState;
use utils::{load_settings_or_default, save_settings};

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (settings, first_run) = load_settings_or_default();
    if first_run {
        // Write defaults so there is a file to edit
        save_settings(&settings);
    }
    tracing::info!(
        base_url = %settings.ollama.base_url,
        model = %settings.ollama.model,
        repo = %settings.updates.local_repo_path.display(),
        "starting"
    );

    let icon = tray::load_icon();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(APP_TITLE)
            .with_position([100.0, 100.0])
            .with_inner_size([400.0, 500.0])
            .with_min_inner_size([300.0, 250.0])
            .with_icon(icon.to_egui()),
        vsync: true, // Limit to monitor refresh rate
        ..Default::default()
    };
    eframe::run_native(
        APP_TITLE,
        options,
        Box::new(move |cc| Box::new(ChatApplication::new(cc, settings, icon))),
    )
}

struct ChatApplication {
    state: Arc<Mutex<AppState>>,
    #[cfg(feature = "tray")]
    tray: Option<tray::TrayHandle>,
}

impl ChatApplication {
    #[cfg_attr(not(feature = "tray"), allow(unused_variables))]
    fn new(
        cc: &eframe::CreationContext<'_>,
        settings: shared::settings::AppSettings,
        icon: tray::IconRgba,
    ) -> Self {
        let mut state = AppState::new(settings);
        state.start_model_check();

        #[cfg(feature = "tray")]
        let tray = match tray::TrayHandle::spawn(&cc.egui_ctx, icon) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "tray unavailable; closing the window will exit");
                None
            }
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            #[cfg(feature = "tray")]
            tray,
        }
    }

    fn tray_active(&self) -> bool {
        #[cfg(feature = "tray")]
        {
            self.tray.is_some()
        }
        #[cfg(not(feature = "tray"))]
        {
            false
        }
    }

    /// Drain tray menu/icon commands.
    fn poll_tray(&self, ctx: &egui::Context, s: &mut AppState) {
        #[cfg(feature = "tray")]
        {
            let Some(tray) = &self.tray else {
                return;
            };
            if tray.quit_requested() {
                s.quitting = true;
            }
            while let Some(cmd) = tray.try_recv() {
                match cmd {
                    tray::TrayCommand::Show => {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
                        ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
                    }
                    tray::TrayCommand::Quit => {
                        s.quitting = true;
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                }
            }
        }
        #[cfg(not(feature = "tray"))]
        let _ = (ctx, s);
    }

    fn hide_to_tray(&self, ctx: &egui::Context, s: &mut AppState) {
        ctx.send_viewport_cmd(egui::ViewportCommand::Visible(false));
        if !s.tray_notice_shown {
            s.tray_notice_shown = true;
            #[cfg(feature = "tray")]
            tray::show_balloon();
        }
    }
}

impl eframe::App for ChatApplication {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let state = self.state.clone();
        let mut s = state.lock();

        // Poll background jobs (non-blocking)
        s.poll();
        self.poll_tray(ctx, &mut s);

        if s.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        // Close / minimize to tray
        let (close_requested, minimized) = ctx.input(|i| {
            (
                i.viewport().close_requested(),
                i.viewport().minimized.unwrap_or(false),
            )
        });
        let action = close_action(
            s.quitting,
            self.tray_active(),
            s.settings.window.minimize_to_tray,
        );
        if close_requested && action == CloseAction::HideToTray {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            self.hide_to_tray(ctx, &mut s);
        } else if minimized && action == CloseAction::HideToTray {
            self.hide_to_tray(ctx, &mut s);
        }

        let modal_open = s.dialog.is_some();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.add_space(4.0);
            let label = if s.is_updating() {
                "Checking for updates..."
            } else {
                "Check for updates"
            };
            let button = egui::Button::new(label).min_size(egui::vec2(ui.available_width(), 28.0));
            if ui
                .add_enabled(!modal_open && !s.is_updating(), button)
                .clicked()
            {
                s.check_for_updates();
            }
            ui.add_space(4.0);
        });

        egui::TopBottomPanel::bottom("input").show(ctx, |ui| {
            ui.add_space(4.0);
            let enabled = !modal_open && !s.is_chatting();
            let response = ui.add_enabled(
                enabled,
                egui::TextEdit::singleline(&mut s.input_text)
                    .hint_text("Type your message here...")
                    .desired_width(f32::INFINITY),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                s.send_message();
                response.request_focus();
            }
            ui.add_space(4.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for line in s.transcript.lines() {
                        ui.add(egui::Label::new(&line.text).wrap(true).selectable(true))
                            .on_hover_text(line.formatted_time());
                    }
                    if s.is_chatting() {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.weak("Waiting for Ollama...");
                        });
                    }
                });
        });

        let dismissed = s
            .dialog
            .as_ref()
            .map(|d| MessageBox::new(d).show(ctx))
            .unwrap_or(false);
        if dismissed && s.dismiss_dialog() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}
