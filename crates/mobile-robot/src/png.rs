use crate::{Result, RobotError};

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Minimal PNG header reader.
pub struct Png<'a> {
    bytes: &'a [u8],
}

impl<'a> Png<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Width and height from the IHDR chunk.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        if self.bytes.len() < 24 {
            return Err(RobotError::Png(format!(
                "{} bytes is too short for a PNG header",
                self.bytes.len()
            )));
        }
        if self.bytes[..8] != SIGNATURE {
            return Err(RobotError::Png("missing PNG signature".to_string()));
        }
        if &self.bytes[12..16] != b"IHDR" {
            return Err(RobotError::Png("first chunk is not IHDR".to_string()));
        }

        let width = u32::from_be_bytes([self.bytes[16], self.bytes[17], self.bytes[18], self.bytes[19]]);
        let height = u32::from_be_bytes([self.bytes[20], self.bytes[21], self.bytes[22], self.bytes[23]]);
        Ok((width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    const ONE_PIXEL: &str =
        "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAIAAACQd1PeAAAAD0lEQVR4nGNgYAAAAAMAAWgmWQ0AAAAASUVORK5CYII=";

    #[test]
    fn test_one_pixel_dimensions() {
        let bytes = STANDARD.decode(ONE_PIXEL).unwrap();
        assert_eq!(Png::new(&bytes).dimensions().unwrap(), (1, 1));
    }

    #[test]
    fn test_rejects_non_png() {
        let err = Png::new(b"IAMADUCK").dimensions().unwrap_err();
        assert!(matches!(err, RobotError::Png(_)));

        let mut bytes = STANDARD.decode(ONE_PIXEL).unwrap();
        bytes[0] = 0;
        assert!(Png::new(&bytes).dimensions().is_err());
    }
}
