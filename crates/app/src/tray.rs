//! System tray presence
//!
//! With the `tray` feature the window hides to a notification-area icon
//! instead of closing, offers a Show/Quit context menu, and pops a balloon
//! notification the first time it disappears. The decisions are plain
//! functions so they are compiled and tested without the feature.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::Duration;

pub const APP_TITLE: &str = "General Purpose Agent";
#[cfg_attr(not(feature = "tray"), allow(dead_code))]
pub const BALLOON_TEXT: &str = "General Purpose Agent is still running in the system tray.";
const ICON_FILE: &str = "icon.png";
const FALLBACK_ICON_SIZE: u32 = 32;
#[cfg_attr(not(all(feature = "tray", target_os = "linux")), allow(dead_code))]
const TRAY_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands coming from the tray icon or its menu
#[cfg_attr(not(feature = "tray"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayCommand {
    Show,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    HideToTray,
    Exit,
}

/// What to do when the window is asked to close or minimize.
pub fn close_action(quitting: bool, tray_active: bool, minimize_to_tray: bool) -> CloseAction {
    if !quitting && tray_active && minimize_to_tray {
        CloseAction::HideToTray
    } else {
        CloseAction::Exit
    }
}

/// Raw RGBA icon shared by the window and the tray
#[derive(Debug, Clone)]
pub struct IconRgba {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl IconRgba {
    pub fn to_egui(&self) -> egui::IconData {
        egui::IconData {
            rgba: self.rgba.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

fn icon_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        paths.push(dir.join(ICON_FILE));
    }
    paths.push(PathBuf::from(ICON_FILE));
    paths
}

/// `icon.png` next to the executable or in the working directory, else a generated badge.
pub fn load_icon() -> IconRgba {
    load_icon_from(&icon_candidates())
}

fn load_icon_from(candidates: &[PathBuf]) -> IconRgba {
    candidates
        .iter()
        .find_map(|p| match image::open(p) {
            Ok(img) => {
                let rgba = img.into_rgba8();
                let (width, height) = rgba.dimensions();
                Some(IconRgba {
                    rgba: rgba.into_raw(),
                    width,
                    height,
                })
            }
            Err(e) => {
                if p.exists() {
                    tracing::warn!(path = %p.display(), error = %e, "could not load icon");
                }
                None
            }
        })
        .unwrap_or_else(fallback_icon)
}

/// Filled circle on a transparent background.
pub fn fallback_icon() -> IconRgba {
    let size = FALLBACK_ICON_SIZE;
    let center = (size as f32 - 1.0) / 2.0;
    let radius = size as f32 / 2.0 - 1.0;
    let img = image::RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        if dx * dx + dy * dy <= radius * radius {
            image::Rgba([52, 120, 200, 255])
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    });
    IconRgba {
        rgba: img.into_raw(),
        width: size,
        height: size,
    }
}

/// Block until the thread that owns the tray icon says whether it built one.
#[cfg_attr(not(all(feature = "tray", target_os = "linux")), allow(dead_code))]
fn wait_until_ready(ready: &Receiver<Result<(), String>>, timeout: Duration) -> anyhow::Result<()> {
    match ready.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!(e)),
        Err(e) => Err(anyhow::anyhow!("tray thread did not report: {}", e)),
    }
}

#[cfg(feature = "tray")]
pub use platform::{show_balloon, TrayHandle};

#[cfg(feature = "tray")]
mod platform {
    use super::{IconRgba, TrayCommand, APP_TITLE, BALLOON_TEXT};
    use anyhow::Result;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::Arc;
    use tray_icon::menu::{Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem};
    use tray_icon::{Icon, MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent};

    pub struct TrayHandle {
        commands: Receiver<TrayCommand>,
        quit_requested: Arc<AtomicBool>,
        // Dropping the icon removes it from the tray; on Linux it lives on the GTK thread
        _icon: Option<TrayIcon>,
    }

    fn build_icon(icon: &IconRgba) -> Result<(TrayIcon, MenuId, MenuId)> {
        let menu = Menu::new();
        let show = MenuItem::new("Show", true, None);
        let quit = MenuItem::new("Quit", true, None);
        menu.append(&show)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&quit)?;

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(APP_TITLE)
            .with_icon(Icon::from_rgba(icon.rgba.clone(), icon.width, icon.height)?)
            .build()?;
        Ok((tray, show.id().clone(), quit.id().clone()))
    }

    fn install_handlers(
        ctx: egui::Context,
        show_id: MenuId,
        quit_id: MenuId,
        tx: Sender<TrayCommand>,
        quit_requested: Arc<AtomicBool>,
    ) {
        let restore = {
            let ctx = ctx.clone();
            move || {
                // Sent from here as well: a hidden window may not run its update loop
                ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
                ctx.send_viewport_cmd(egui::ViewportCommand::Minimized(false));
                ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
            }
        };

        let menu_tx = tx.clone();
        let menu_restore = restore.clone();
        let menu_ctx = ctx.clone();
        MenuEvent::set_event_handler(Some(move |event: MenuEvent| {
            if event.id == show_id {
                let _ = menu_tx.send(TrayCommand::Show);
                menu_restore();
            } else if event.id == quit_id {
                quit_requested.store(true, Ordering::SeqCst);
                let _ = menu_tx.send(TrayCommand::Quit);
                menu_ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
            menu_ctx.request_repaint();
        }));

        TrayIconEvent::set_event_handler(Some(move |event: TrayIconEvent| {
            if let TrayIconEvent::Click {
                button: MouseButton::Left,
                button_state: MouseButtonState::Up,
                ..
            } = event
            {
                let _ = tx.send(TrayCommand::Show);
                restore();
                ctx.request_repaint();
            }
        }));
    }

    impl TrayHandle {
        pub fn spawn(ctx: &egui::Context, icon: IconRgba) -> Result<Self> {
            let (tx, commands) = channel();
            let quit_requested = Arc::new(AtomicBool::new(false));

            #[cfg(target_os = "linux")]
            let tray = {
                // libappindicator needs a running GTK main loop on the thread that owns the icon
                let ctx = ctx.clone();
                let quit_flag = quit_requested.clone();
                let (ready_tx, ready_rx) = channel();
                std::thread::spawn(move || {
                    if let Err(e) = gtk::init() {
                        let _ = ready_tx.send(Err(format!("GTK init failed: {}", e)));
                        return;
                    }
                    match build_icon(&icon) {
                        Ok((_tray, show_id, quit_id)) => {
                            install_handlers(ctx, show_id, quit_id, tx, quit_flag);
                            let _ = ready_tx.send(Ok(()));
                            gtk::main();
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(format!("could not create tray icon: {}", e)));
                        }
                    }
                });
                super::wait_until_ready(&ready_rx, super::TRAY_READY_TIMEOUT)?;
                None
            };

            #[cfg(not(target_os = "linux"))]
            let tray = {
                let (tray, show_id, quit_id) = build_icon(&icon)?;
                install_handlers(ctx.clone(), show_id, quit_id, tx, quit_requested.clone());
                Some(tray)
            };

            tracing::info!("tray icon installed");
            Ok(Self {
                commands,
                quit_requested,
                _icon: tray,
            })
        }

        pub fn try_recv(&self) -> Option<TrayCommand> {
            self.commands.try_recv().ok()
        }

        /// Set by the Quit menu item before it asks the window to close
        pub fn quit_requested(&self) -> bool {
            self.quit_requested.load(Ordering::SeqCst)
        }
    }

    /// Balloon notification shown the first time the window hides to the tray.
    pub fn show_balloon() {
        std::thread::spawn(|| {
            if let Err(e) = notify_rust::Notification::new()
                .summary(APP_TITLE)
                .body(BALLOON_TEXT)
                .timeout(notify_rust::Timeout::Milliseconds(3000))
                .show()
            {
                tracing::warn!(error = %e, "could not show tray notification");
            }
        });
    }
}
