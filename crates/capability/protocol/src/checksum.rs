//! 帧校验
//!
//! 加和校验：指定字节区间求和取模 256，与帧尾前的校验字节比较。

use crate::correlator::FrameValidator;
use crate::error::ProtocolError;

/// STX 起始标记。
pub const STX: u8 = 0x02;
/// ETX 结束标记。
pub const ETX: u8 = 0x03;

/// 加和校验（模 256）。
pub fn additive_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte))
}

/// 带起止标记与加和校验的帧校验器。
///
/// 校验区间为 `[checksum_from, len - trailer)`，校验字节位于 `len - trailer`。
#[derive(Debug, Clone)]
pub struct FramedChecksumValidator {
    pub start_marker: Option<u8>,
    pub end_marker: Option<u8>,
    pub checksum_from: usize,
    pub trailer: usize,
    pub min_len: usize,
}

impl FramedChecksumValidator {
    /// `STX | ... | CRC | ETX` 帧：从第 1 字节累加到校验字节之前。
    pub fn stx_etx() -> Self {
        Self {
            start_marker: Some(STX),
            end_marker: Some(ETX),
            checksum_from: 1,
            trailer: 2,
            min_len: 4,
        }
    }
}

impl FrameValidator for FramedChecksumValidator {
    fn validate(&self, frame: &[u8]) -> Result<(), ProtocolError> {
        if frame.len() < self.min_len.max(self.checksum_from + self.trailer) {
            return Err(ProtocolError::ProtocolValidation(format!(
                "frame too short: {} bytes",
                frame.len()
            )));
        }
        if let Some(marker) = self.start_marker {
            if frame[0] != marker {
                return Err(ProtocolError::ProtocolValidation(format!(
                    "bad start marker {:02X}",
                    frame[0]
                )));
            }
        }
        if let Some(marker) = self.end_marker {
            let last = frame[frame.len() - 1];
            if last != marker {
                return Err(ProtocolError::ProtocolValidation(format!(
                    "bad end marker {:02X}",
                    last
                )));
            }
        }
        let position = frame.len() - self.trailer;
        let expected = additive_checksum(&frame[self.checksum_from..position]);
        if frame[position] != expected {
            return Err(ProtocolError::ProtocolValidation(format!(
                "checksum mismatch: expected {:02X}, got {:02X}",
                expected, frame[position]
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut frame = vec![STX];
        frame.extend_from_slice(body);
        frame.push(additive_checksum(body));
        frame.push(ETX);
        frame
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(additive_checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(additive_checksum(&[]), 0);
    }

    #[test]
    fn test_stx_etx_validation() {
        let validator = FramedChecksumValidator::stx_etx();
        let good = frame(&[0x01, 0x00, 0x02, 0x10, 0x20]);
        assert!(validator.validate(&good).is_ok());

        let mut corrupted = good.clone();
        corrupted[4] ^= 0xFF;
        assert!(matches!(
            validator.validate(&corrupted),
            Err(ProtocolError::ProtocolValidation(_))
        ));

        let mut unterminated = good;
        unterminated.pop();
        assert!(validator.validate(&unterminated).is_err());
        assert!(validator.validate(&[STX, ETX]).is_err());
    }
}
