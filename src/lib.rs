//! PhotoFE — a non-destructive raster image edit pipeline.
//!
//! Upload an image, then crop, resize, rotate/flip, color-adjust, filter, or
//! annotate it, with a live preview of every in-progress change. A change is
//! only ever speculative (`temp`) until Apply commits it into the session's
//! single committed image (`current`), recorded on a bounded undo stack.
//! Cancel or switching tools discards it. The UI chrome (toolbar, upload
//! widget, auth) lives elsewhere and talks to [`session::EditSession`]
//! through its action/effect interface.
//!
//! Call [`logger::init`] once at startup to enable the session log file;
//! without it the log macros are silent no-ops.
//!
//! ```no_run
//! use photofe::bitmap::Bitmap;
//! use photofe::session::{EditSession, ToolKind};
//!
//! let original = photofe::io::decode_upload(&std::fs::read("photo.png")?, 32 << 20)?;
//! let mut session = EditSession::new(original);
//! session.select_tool(Some(ToolKind::Resize));
//! session.set_resize_width(800);
//! session.apply();
//! let artifact = session.export()?;
//! std::fs::write(&artifact.filename, &artifact.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bitmap;
pub mod history;
pub mod io;
pub mod loader;
pub mod logger;
pub mod ops;
pub mod overlay;
pub mod session;

pub use bitmap::Bitmap;
pub use session::{Action, EditSession, Effect, SessionConfig, SessionState, ToolKind};
