//! ELM327 reply parsing
//!
//! The adapter answers every command with zero or more text lines followed
//! by a `>` prompt. Mode 01 data replies carry a `41 XX` header (mode + 0x40,
//! then the PID) followed by the data bytes.

use crate::error::ObdError;
use crate::pid::Pid;

/// Prompt the adapter prints once it is ready for the next command
pub const PROMPT: u8 = b'>';

/// Mode 01 positive response marker (0x01 + 0x40)
const MODE_01_REPLY: u8 = 0x41;

/// Command that asks which Mode 01 PIDs 01-20 are supported; any positive
/// reply proves the vehicle bus is answering.
pub const PROBE: &str = "0100";

/// Format the request for a Mode 01 PID (the caller terminates it with CR)
pub fn request(pid: Pid) -> String {
    format!("01{:02X}", pid.as_hex())
}

/// Split a raw adapter reply into meaningful lines, dropping the prompt,
/// the echoed command and progress chatter.
pub fn reply_lines<'a>(raw: &'a str, command: &str) -> Vec<&'a str> {
    let command = command.trim();
    raw.split(['\r', '\n'])
        .map(|line| line.trim_matches(|c: char| c == PROMPT as char || c.is_whitespace()))
        .filter(|line| !line.is_empty())
        .filter(|line| !line.eq_ignore_ascii_case(command))
        .filter(|line| !line.to_ascii_uppercase().starts_with("SEARCHING"))
        .collect()
}

/// Map adapter error text in a reply to an [`ObdError`]
fn reply_error(pid_hex: u8, command: &str, lines: &[&str]) -> Option<ObdError> {
    for line in lines {
        let upper = line.to_ascii_uppercase();
        if upper.contains("NO DATA") {
            return Some(ObdError::NoData(pid_hex));
        }
        if upper.contains("UNABLE TO CONNECT")
            || upper.contains("CAN ERROR")
            || (upper.contains("BUS INIT") && upper.contains("ERROR"))
        {
            return Some(ObdError::VehicleNotConnected);
        }
        if upper == "?" {
            return Some(ObdError::InvalidResponse(format!(
                "adapter rejected {}",
                command
            )));
        }
    }
    None
}

/// Find the data bytes following a `41 XX` header
fn find_payload(pid_hex: u8, lines: &[&str]) -> Option<Vec<u8>> {
    // Several ECUs may answer; the first one carrying our PID wins.
    lines.iter().filter_map(|line| hex_bytes(line)).find_map(|bytes| {
        bytes
            .windows(2)
            .position(|w| w[0] == MODE_01_REPLY && w[1] == pid_hex)
            .map(|start| bytes[start + 2..].to_vec())
    })
}

/// Parse the reply to a Mode 01 request into the PID's data bytes.
pub fn parse_pid_reply(pid: Pid, raw: &str) -> Result<Vec<u8>, ObdError> {
    let command = request(pid);
    let lines = reply_lines(raw, &command);

    if lines.is_empty() {
        return Err(ObdError::InvalidResponse("empty reply".to_string()));
    }
    if let Some(err) = reply_error(pid.as_hex(), &command, &lines) {
        return Err(err);
    }

    match find_payload(pid.as_hex(), &lines) {
        Some(data) if data.len() >= pid.response_bytes() => {
            Ok(data[..pid.response_bytes()].to_vec())
        }
        Some(_) => Err(ObdError::InvalidResponse(format!(
            "truncated reply for PID {:02X}: {}",
            pid.as_hex(),
            lines.join(" | ")
        ))),
        None => Err(ObdError::InvalidResponse(format!(
            "no 41 {:02X} header in reply: {}",
            pid.as_hex(),
            lines.join(" | ")
        ))),
    }
}

/// Check the reply to [`PROBE`]
pub fn check_probe_reply(raw: &str) -> Result<(), ObdError> {
    let lines = reply_lines(raw, PROBE);
    if let Some(err) = reply_error(0x00, PROBE, &lines) {
        return Err(match err {
            ObdError::NoData(_) => ObdError::VehicleNotConnected,
            other => other,
        });
    }
    match find_payload(0x00, &lines) {
        Some(_) => Ok(()),
        None => Err(ObdError::InvalidResponse(format!(
            "unexpected probe reply: {}",
            lines.join(" | ")
        ))),
    }
}

/// Decode a line of hex digits, with or without separating spaces.
/// A leading 11-bit CAN header (three digits) is skipped.
fn hex_bytes(line: &str) -> Option<Vec<u8>> {
    if !line.is_ascii() {
        return None;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() > 1 {
        let body = if tokens[0].len() == 3 { &tokens[1..] } else { &tokens[..] };
        return body
            .iter()
            .map(|t| {
                if t.len() == 2 {
                    u8::from_str_radix(t, 16).ok()
                } else {
                    None
                }
            })
            .collect();
    }

    let digits = if line.len() % 2 == 1 && line.len() > 3 {
        &line[3..]
    } else {
        line
    };
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_format() {
        assert_eq!(request(Pid::Rpm), "010C");
        assert_eq!(request(Pid::FuelLevel), "012F");
    }

    #[test]
    fn test_parse_spaced_reply() {
        let bytes = parse_pid_reply(Pid::Rpm, "41 0C 1A F8 \r\r>").unwrap();
        assert_eq!(bytes, vec![0x1A, 0xF8]);
    }

    #[test]
    fn test_parse_compact_reply_with_echo() {
        let bytes = parse_pid_reply(Pid::Speed, "010D\r410D32\r\r>").unwrap();
        assert_eq!(bytes, vec![0x32]);
    }

    #[test]
    fn test_parse_skips_searching_and_other_lines() {
        let raw = "SEARCHING...\r7E8 03 41 05 7B\r\r>";
        let bytes = parse_pid_reply(Pid::CoolantTemp, raw).unwrap();
        assert_eq!(bytes, vec![0x7B]);
    }

    #[test]
    fn test_no_data() {
        let err = parse_pid_reply(Pid::FuelLevel, "NO DATA\r\r>").unwrap_err();
        assert!(matches!(err, ObdError::NoData(0x2F)));
    }

    #[test]
    fn test_unable_to_connect() {
        let err = parse_pid_reply(Pid::Rpm, "SEARCHING...\rUNABLE TO CONNECT\r>").unwrap_err();
        assert!(matches!(err, ObdError::VehicleNotConnected));
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_pid_reply(Pid::Rpm, "?\r>").unwrap_err();
        assert!(matches!(err, ObdError::InvalidResponse(_)));
    }

    #[test]
    fn test_truncated_reply() {
        let err = parse_pid_reply(Pid::Rpm, "41 0C 1A\r>").unwrap_err();
        assert!(matches!(err, ObdError::InvalidResponse(_)));
    }

    #[test]
    fn test_reply_for_other_pid() {
        let err = parse_pid_reply(Pid::Rpm, "41 0D 32\r>").unwrap_err();
        assert!(matches!(err, ObdError::InvalidResponse(_)));
    }

    #[test]
    fn test_probe_reply() {
        assert!(check_probe_reply("SEARCHING...\r41 00 BE 3E B8 11\r\r>").is_ok());
        assert!(matches!(
            check_probe_reply("UNABLE TO CONNECT\r>"),
            Err(ObdError::VehicleNotConnected)
        ));
        assert!(matches!(
            check_probe_reply("NO DATA\r>"),
            Err(ObdError::VehicleNotConnected)
        ));
    }
}
