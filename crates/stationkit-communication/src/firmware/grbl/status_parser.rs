//! GRBL Status Report Parsing
//!
//! Status reports look like `<Idle|MPos:1.000,2.500,-3.000|FS:0,0>`. Any
//! report that cannot be parsed yields `None`; a malformed reply is treated
//! as missing data, never as an error.

use super::{ACK, IDLE_MARKER};
use stationkit_core::MachinePosition;

/// Status report parsing helpers
pub struct StatusParser;

impl StatusParser {
    /// Parse machine state from status report
    /// Extracts state from format: <Idle|...> or <Run|...>
    pub fn parse_machine_state(status_line: &str) -> Option<String> {
        let start = status_line.find('<')?;
        let end = status_line[start..].find('|')?;
        let state = &status_line[start + 1..start + end];
        if state.is_empty() {
            None
        } else {
            Some(state.to_string())
        }
    }

    /// Parse machine position from status report
    ///
    /// The three values after `MPos:` must all be numeric; extra axes are
    /// ignored.
    pub fn parse_mpos(status_line: &str) -> Option<MachinePosition> {
        let field = Self::extract_field(status_line, "MPos:")?;
        let mut coords = field.split(',').map(|s| s.trim().parse::<f64>());

        let x = coords.next()?.ok()?;
        let y = coords.next()?.ok()?;
        let z = coords.next()?.ok()?;
        Some(MachinePosition::new(x, y, z))
    }

    /// True if a polled line signals that a move has finished
    ///
    /// Matches the idle marker or the acknowledgement token anywhere in the
    /// line.
    pub fn is_completion(line: &str) -> bool {
        line.contains(IDLE_MARKER) || line.contains(ACK)
    }

    /// Text of `field_prefix` up to the next `|` or the end of the report
    fn extract_field<'a>(status_line: &'a str, field_prefix: &str) -> Option<&'a str> {
        let search_line = status_line
            .strip_prefix('<')
            .and_then(|line| line.strip_suffix('>'))
            .unwrap_or(status_line);

        let start = search_line.find(field_prefix)? + field_prefix.len();
        let rest = &search_line[start..];
        let end = rest.find('|').unwrap_or(rest.len());
        Some(&rest[..end])
    }
}
