// Property tests for the session laws: undo/redo inversion, bounded history,
// and apply/cancel symmetry, across arbitrary commit sequences.

use image::Rgba;
use photofe::bitmap::Bitmap;
use photofe::ops::adjustments::AdjustParams;
use photofe::session::{EditSession, ToolKind};
use proptest::collection::vec;
use proptest::prelude::*;

fn fresh_session() -> EditSession {
    EditSession::new(Bitmap::filled(16, 16, Rgba([120, 90, 60, 255])))
}

/// One full commit through the adjust tool.
fn commit_brightness(session: &mut EditSession, brightness: f32) {
    session.select_tool(Some(ToolKind::Adjust));
    session.set_adjustments(AdjustParams {
        brightness,
        ..Default::default()
    });
    session.apply();
}

proptest! {
    #[test]
    fn undo_then_redo_restores_current(values in vec(-0.5f32..0.5, 1..22)) {
        let mut session = fresh_session();
        for &b in &values {
            commit_brightness(&mut session, b);
        }

        let before = session.current().clone();
        session.undo();
        session.redo();
        prop_assert!(session.current().same_identity(&before));
    }

    #[test]
    fn undo_depth_never_exceeds_the_cap(values in vec(-0.5f32..0.5, 1..40)) {
        let mut session = fresh_session();
        for &b in &values {
            commit_brightness(&mut session, b);
        }

        let cap = session.config().history_capacity;
        prop_assert_eq!(session.state().history.undo_count(), values.len().min(cap));

        // Walking all the way back always terminates at a no-op.
        let mut undone = 0;
        while !session.undo().is_empty() {
            undone += 1;
            prop_assert!(undone <= cap);
        }
        prop_assert_eq!(undone, values.len().min(cap));
    }

    #[test]
    fn cancel_restores_and_apply_adopts_the_preview(brightness in -0.8f32..0.8) {
        let mut session = fresh_session();
        let before = session.current().clone();

        session.select_tool(Some(ToolKind::Adjust));
        session.set_adjustments(AdjustParams { brightness, ..Default::default() });
        session.cancel();
        prop_assert!(session.current().same_identity(&before));
        prop_assert!(session.temp().is_none());

        session.set_adjustments(AdjustParams { brightness, ..Default::default() });
        let preview = session.temp().cloned();
        session.apply();
        match preview {
            Some(p) => prop_assert!(session.current().same_identity(&p)),
            None => prop_assert!(session.current().same_identity(&before)),
        }
    }

    #[test]
    fn redo_is_dead_after_any_new_commit(
        values in vec(-0.5f32..0.5, 2..10),
        undos in 1usize..5,
    ) {
        let mut session = fresh_session();
        for &b in &values {
            commit_brightness(&mut session, b);
        }
        for _ in 0..undos.min(values.len()) {
            session.undo();
        }
        prop_assert!(session.can_redo());

        commit_brightness(&mut session, 0.33);
        prop_assert!(!session.can_redo());
        prop_assert!(session.redo().is_empty());
    }
}
