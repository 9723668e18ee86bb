//! QR ticket artifacts
//!
//! After a successful booking the server renders a QR code carrying the slot
//! and booking id. Rendering is best-effort: a failure is logged and the
//! booking stands.

use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::registry::{Booking, BookingId};

/// Artifact errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to encode QR payload: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("failed to write ticket: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifacts are disabled")]
    Disabled,
}

/// Produces a side-channel artifact for a booking.
pub trait TicketArtifacts: Send + Sync {
    /// Render the ticket for a fresh booking, returning where it was written.
    fn render(&self, booking: &Booking) -> Result<PathBuf, ArtifactError>;

    /// Location of a previously rendered ticket, if it exists.
    fn locate(&self, booking_id: &str) -> Option<PathBuf>;
}

/// Writes `<dir>/<booking_id>.svg`.
pub struct QrTicketWriter {
    dir: PathBuf,
    min_size: u32,
}

impl QrTicketWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            min_size: 200,
        }
    }

    fn ticket_path(&self, booking_id: &str) -> PathBuf {
        self.dir.join(format!("{}.svg", booking_id))
    }
}

/// Render the QR code for `payload` as an SVG document.
pub fn render_svg(payload: &str, min_size: u32) -> Result<String, ArtifactError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(min_size, min_size)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

impl TicketArtifacts for QrTicketWriter {
    fn render(&self, booking: &Booking) -> Result<PathBuf, ArtifactError> {
        let document = render_svg(&booking.ticket_payload(), self.min_size)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.ticket_path(booking.booking_id.as_str());
        fs::write(&path, document)?;
        Ok(path)
    }

    fn locate(&self, booking_id: &str) -> Option<PathBuf> {
        // Tokens are hex only; anything else could escape the directory.
        if !BookingId::is_well_formed(booking_id) {
            return None;
        }
        let path = self.ticket_path(booking_id);
        path.is_file().then_some(path)
    }
}

/// Artifact generation switched off.
pub struct NoArtifacts;

impl TicketArtifacts for NoArtifacts {
    fn render(&self, _booking: &Booking) -> Result<PathBuf, ArtifactError> {
        Err(ArtifactError::Disabled)
    }

    fn locate(&self, _booking_id: &str) -> Option<PathBuf> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SlotId;

    fn booking() -> Booking {
        Booking {
            slot_id: SlotId::new("A1").unwrap(),
            booking_id: BookingId::from_raw("1234abcd"),
        }
    }

    #[test]
    fn test_render_svg() {
        let svg = render_svg("Slot: A1, BookingID: 1234abcd", 100).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#000000"));
    }

    #[test]
    fn test_writer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QrTicketWriter::new(dir.path().join("qr_codes"));
        let path = writer.render(&booking()).unwrap();
        assert!(path.ends_with("1234abcd.svg"));
        assert_eq!(writer.locate("1234abcd"), Some(path));
        assert_eq!(writer.locate("9999abcd"), None);
    }

    #[test]
    fn test_locate_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let writer = QrTicketWriter::new(dir.path());
        assert_eq!(writer.locate("../../etc/passwd"), None);
        assert_eq!(writer.locate(""), None);
    }

    #[test]
    fn test_no_artifacts() {
        assert!(matches!(
            NoArtifacts.render(&booking()),
            Err(ArtifactError::Disabled)
        ));
    }
}
