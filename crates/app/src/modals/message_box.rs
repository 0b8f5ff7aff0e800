//! Information / critical message box.
//!
//! - Dims and blocks the window behind it
//! - Enter or Escape dismisses, like the OK button, but only from the
//!   frame after the box first appeared

use egui::{Align2, Area, Color32, Context, Id, Key, RichText, Vec2};
use shared::events::{Dialog, DialogKind};

pub struct MessageBox<'a> {
    dialog: &'a Dialog,
    id: Id,
}

impl<'a> MessageBox<'a> {
    pub fn new(dialog: &'a Dialog) -> Self {
        Self {
            dialog,
            id: Id::new("message_box"),
        }
    }

    /// Render the dialog. Returns true once the user dismissed it.
    pub fn show(&self, ctx: &Context) -> bool {
        let mut dismissed = false;
        let frame = ctx.frame_nr();
        let opened_at = self.id.with("opened_at");
        let first_frame =
            ctx.data_mut(|d| *d.get_temp_mut_or_insert_with(opened_at, || frame));

        // Semi-transparent background overlay
        Area::new(self.id.with("overlay"))
            .anchor(Align2::LEFT_TOP, Vec2::ZERO)
            .show(ctx, |ui| {
                let screen_rect = ctx.screen_rect();
                ui.allocate_response(screen_rect.size(), egui::Sense::click());
                ui.painter()
                    .rect_filled(screen_rect, 0.0, Color32::from_black_alpha(140));
            });

        let (icon, color) = match self.dialog.kind {
            DialogKind::Info => ("ℹ", Color32::from_rgb(70, 130, 200)),
            DialogKind::Critical => ("❌", Color32::from_rgb(200, 60, 60)),
        };

        egui::Window::new(&self.dialog.title)
            .id(self.id.with("window"))
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.set_max_width(320.0);
                ui.add_space(6.0);
                ui.horizontal_wrapped(|ui| {
                    ui.label(RichText::new(icon).size(20.0).color(color));
                    ui.label(&self.dialog.body);
                });
                ui.add_space(10.0);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            });

        // Keys pressed while the box was still unseen belong to other widgets
        if frame > first_frame
            && ctx.input(|i| i.key_pressed(Key::Enter) || i.key_pressed(Key::Escape))
        {
            dismissed = true;
        }

        if dismissed {
            ctx.data_mut(|d| d.remove::<u64>(opened_at));
        }
        dismissed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{Event, Modifiers, RawInput};

    fn frame_with_key(ctx: &Context, dialog: &Dialog, key: Option<Key>) -> bool {
        let events = key
            .map(|key| Event::Key {
                key,
                physical_key: None,
                pressed: true,
                repeat: false,
                modifiers: Modifiers::NONE,
            })
            .into_iter()
            .collect();
        let mut dismissed = false;
        let _ = ctx.run(
            RawInput {
                events,
                ..Default::default()
            },
            |ctx| dismissed = MessageBox::new(dialog).show(ctx),
        );
        dismissed
    }

    #[test]
    fn test_enter_on_first_frame_is_ignored() {
        let ctx = Context::default();
        let dialog = Dialog::info("Update Complete", "restart").then_quit();

        assert!(!frame_with_key(&ctx, &dialog, Some(Key::Enter)));
        assert!(!frame_with_key(&ctx, &dialog, None));
        assert!(frame_with_key(&ctx, &dialog, Some(Key::Enter)));
    }

    #[test]
    fn test_next_dialog_is_guarded_again() {
        let ctx = Context::default();
        let first = Dialog::info("No Updates", "up to date");
        assert!(!frame_with_key(&ctx, &first, None));
        assert!(frame_with_key(&ctx, &first, Some(Key::Escape)));

        let second = Dialog::critical("Update Error", "offline");
        assert!(!frame_with_key(&ctx, &second, Some(Key::Escape)));
        assert!(frame_with_key(&ctx, &second, Some(Key::Escape)));
    }
}
