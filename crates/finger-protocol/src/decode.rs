use crate::{DecodeError, Frame, POSITION_DIGITS, TORQUE_DIGITS};
use serde::{Deserialize, Serialize};

/// Torque and position reported by the actuator, each nominally 0..=999.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub torque: i32,
    pub position: i32,
}

/// Decode a frame, rejecting any non-digit in a digit position.
pub fn decode(frame: &Frame) -> Result<TelemetryRecord, DecodeError> {
    Ok(TelemetryRecord {
        torque: checked_number(frame, TORQUE_DIGITS)?,
        position: checked_number(frame, POSITION_DIGITS)?,
    })
}

/// Decode without validation, as the dongle firmware's host tools do. A non-digit
/// byte contributes `byte - '0'` to its place value, so results can leave 0..=999.
pub fn decode_lossy(frame: &Frame) -> TelemetryRecord {
    TelemetryRecord {
        torque: lossy_number(frame, TORQUE_DIGITS),
        position: lossy_number(frame, POSITION_DIGITS),
    }
}

fn checked_number(frame: &Frame, positions: [usize; 3]) -> Result<i32, DecodeError> {
    for index in positions {
        let byte = frame.byte(index);
        if !byte.is_ascii_digit() {
            return Err(DecodeError::NotADigit { index, byte });
        }
    }
    Ok(lossy_number(frame, positions))
}

fn lossy_number(frame: &Frame, positions: [usize; 3]) -> i32 {
    positions
        .iter()
        .fold(0, |acc, &i| acc * 10 + (i32::from(frame.byte(i)) - i32::from(b'0')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> Frame {
        Frame::from_bytes(bytes).unwrap()
    }

    #[test]
    fn decodes_torque_and_position() {
        let rec = decode(&frame(b"$123**675*\0")).unwrap();
        assert_eq!(
            rec,
            TelemetryRecord {
                torque: 123,
                position: 675
            }
        );
    }

    #[test]
    fn filler_bytes_are_ignored() {
        let rec = decode(&frame(b"$000\xFF\x01999\x7F\x80")).unwrap();
        assert_eq!(rec.torque, 0);
        assert_eq!(rec.position, 999);
    }

    #[test]
    fn every_digit_combination_stays_in_range() {
        for d in 0u8..10 {
            let bytes = [
                b'$',
                b'0' + d,
                b'0' + (9 - d),
                b'0' + d,
                b'*',
                b'*',
                b'0' + (9 - d),
                b'0' + d,
                b'0' + (9 - d),
                b'*',
                0,
            ];
            let rec = decode(&frame(&bytes)).unwrap();
            let d = i32::from(d);
            assert_eq!(rec.torque, 100 * d + 10 * (9 - d) + d);
            assert_eq!(rec.position, 100 * (9 - d) + 10 * d + (9 - d));
            assert!((0..=999).contains(&rec.torque));
            assert!((0..=999).contains(&rec.position));
        }
    }

    #[test]
    fn non_digit_is_rejected_by_checked_decode() {
        let f = frame(b"$12345*67*\0");
        assert_eq!(
            decode(&f),
            Err(DecodeError::NotADigit {
                index: 6,
                byte: b'*'
            })
        );
    }

    #[test]
    fn lossy_decode_keeps_raw_arithmetic() {
        let f = frame(b"$12345*67*\0");
        let rec = decode_lossy(&f);
        assert_eq!(rec.torque, 123);
        // '*' is 0x2A, six below '0'.
        assert_eq!(rec.position, -6 * 100 + 6 * 10 + 7);
    }

    #[test]
    fn record_serializes_as_plain_object() {
        let json = serde_json::to_string(&TelemetryRecord {
            torque: 12,
            position: 340,
        })
        .unwrap();
        assert_eq!(json, r#"{"torque":12,"position":340}"#);
    }
}
