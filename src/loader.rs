// ============================================================================
// ASYNC DECODE PIPELINE — background image decoding with stale-result guard
// ============================================================================
//
// Decoding suspends relative to the caller: work runs on a background thread
// and completes through a channel the event loop drains. Every request is
// keyed by a token from a generation counter; a completion whose token is
// not the most recently requested one is dropped on the floor, so a slow
// decode can never clobber the result of a newer request. There is no
// cancellation — an abandoned decode still runs to completion and is simply
// discarded here.

use std::sync::mpsc;
use std::thread;

use crate::bitmap::Bitmap;
use crate::io::{self, UploadError};

/// Identifies one decode request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeTicket(u64);

/// A finished decode as it comes off the channel.
struct DecodeCompletion {
    token: u64,
    outcome: Result<Bitmap, UploadError>,
}

/// Owns the channel pair and the request generation counter.
pub struct ImageLoader {
    sender: mpsc::Sender<DecodeCompletion>,
    receiver: mpsc::Receiver<DecodeCompletion>,
    latest_token: u64,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            latest_token: 0,
        }
    }

    /// Kick off a background decode of an upload payload. Size/format
    /// validation is synchronous — a rejected payload never spawns a thread
    /// and returns the rejection immediately.
    pub fn request_decode(
        &mut self,
        bytes: Vec<u8>,
        max_bytes: usize,
    ) -> Result<DecodeTicket, UploadError> {
        io::validate_upload(&bytes, max_bytes)?;

        self.latest_token += 1;
        let token = self.latest_token;
        let sender = self.sender.clone();
        thread::spawn(move || {
            let outcome = io::decode_upload(&bytes, max_bytes);
            // The receiver may be gone if the session shut down; that decode
            // is abandoned either way.
            let _ = sender.send(DecodeCompletion { token, outcome });
        });
        Ok(DecodeTicket(token))
    }

    /// Drain finished decodes, keeping only the one matching the latest
    /// request. Call from the event loop; returns `None` while the decode is
    /// still in flight (or when nothing was requested).
    pub fn poll(&mut self) -> Option<Result<Bitmap, UploadError>> {
        let mut fresh = None;
        for completion in self.receiver.try_iter() {
            if completion.token == self.latest_token {
                fresh = Some(completion.outcome);
            } else {
                crate::log_info!(
                    "loader: dropping stale decode completion (token {} < {})",
                    completion.token,
                    self.latest_token
                );
            }
        }
        fresh
    }

    /// Block until the latest request completes (headless/test use). Yields
    /// at most one result per ticket; a superseded ticket returns `None`
    /// immediately.
    pub fn wait(&mut self, ticket: DecodeTicket) -> Option<Result<Bitmap, UploadError>> {
        if ticket.0 != self.latest_token {
            return None;
        }
        let deadline = std::time::Duration::from_secs(30);
        while let Ok(completion) = self.receiver.recv_timeout(deadline) {
            if completion.token == self.latest_token {
                return Some(completion.outcome);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_bytes(v: u8) -> Vec<u8> {
        io::encode_png(&Bitmap::filled(4, 4, Rgba([v, v, v, 255]))).unwrap()
    }

    const MAX: usize = 32 * 1024 * 1024;

    #[test]
    fn decode_completes_with_the_requested_image() {
        let mut loader = ImageLoader::new();
        let ticket = loader.request_decode(png_bytes(42), MAX).unwrap();
        let bitmap = loader.wait(ticket).unwrap().unwrap();
        assert_eq!(bitmap.dimensions(), (4, 4));
        assert_eq!(bitmap.pixels().get_pixel(0, 0).0, [42, 42, 42, 255]);
    }

    #[test]
    fn stale_completion_is_discarded() {
        let mut loader = ImageLoader::new();
        let old = loader.request_decode(png_bytes(1), MAX).unwrap();
        let new = loader.request_decode(png_bytes(2), MAX).unwrap();
        assert_ne!(old, new);

        // Only the newest request may ever surface.
        let bitmap = loader.wait(new).unwrap().unwrap();
        assert_eq!(bitmap.pixels().get_pixel(0, 0).0, [2, 2, 2, 255]);
        // The superseded ticket can no longer produce a result.
        assert!(loader.wait(old).is_none());
    }

    #[test]
    fn rejection_is_synchronous() {
        let mut loader = ImageLoader::new();
        let err = loader.request_decode(vec![0u8; 100], 10).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));
        assert!(loader.poll().is_none());
    }
}
