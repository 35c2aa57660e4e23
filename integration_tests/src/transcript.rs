//! Parsing of the firmware's diagnostic lines.
//!
//! Every status line starts with `[STM32WL] `. Step lines read
//! `<what> ... <status>`; a received packet adds Data, RSSI and SNR lines.

/// Prefix on every firmware status line
pub const PREFIX: &str = "[STM32WL] ";

/// Step that starts each listen window
pub const WAITING: &str = "Waiting for incoming transmission";

/// Step that reports `begin()`
pub const INITIALIZING: &str = "Initializing";

/// Result closing a step line.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Success,
    Timeout,
    CrcError,
    Failed(i32),
}

/// One parsed line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// `<what> ... <status>`; status is `None` if the line is still open
    Step { what: String, status: Option<Status> },
    Data(String),
    Rssi(f32),
    Snr(f32),
    /// Anything not produced by the status output
    Other(String),
}

/// Parse a single line, without its terminator.
pub fn parse_line(raw: &str) -> Line {
    let Some(body) = raw.strip_prefix(PREFIX) else {
        return Line::Other(raw.to_string());
    };

    if let Some(data) = body.strip_prefix("Data:") {
        return Line::Data(data.trim_start_matches('\t').to_string());
    }
    if let Some(value) = body
        .strip_prefix("RSSI:")
        .and_then(|rest| rest.trim().strip_suffix(" dBm"))
        .and_then(|v| v.parse().ok())
    {
        return Line::Rssi(value);
    }
    if let Some(value) = body
        .strip_prefix("SNR:")
        .and_then(|rest| rest.trim().strip_suffix(" dB"))
        .and_then(|v| v.parse().ok())
    {
        return Line::Snr(value);
    }

    // Payloads may contain anything, so steps are matched last
    if let Some((what, rest)) = body.split_once(" ... ") {
        return Line::Step {
            what: what.to_string(),
            status: parse_status(rest.trim()),
        };
    }

    Line::Other(raw.to_string())
}

fn parse_status(text: &str) -> Option<Status> {
    match text {
        "success!" => Some(Status::Success),
        "timeout!" => Some(Status::Timeout),
        "CRC error!" => Some(Status::CrcError),
        _ => text
            .strip_prefix("failed, code ")
            .and_then(|code| code.parse().ok())
            .map(Status::Failed),
    }
}

/// Outcome of one listen window.
#[derive(Debug, Clone, PartialEq)]
pub struct Reception {
    pub status: Status,
    pub data: Option<String>,
    pub rssi: Option<f32>,
    pub snr: Option<f32>,
}

/// Captured output of one run.
pub struct Transcript {
    lines: Vec<Line>,
}

impl Transcript {
    pub fn new<S: AsRef<str>>(raw: &[S]) -> Self {
        Self {
            lines: raw.iter().map(|l| parse_line(l.as_ref())).collect(),
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Status of `begin()`, if the boot was captured
    pub fn init_status(&self) -> Option<&Status> {
        self.lines.iter().find_map(|line| match line {
            Line::Step { what, status } if what == INITIALIZING => status.as_ref(),
            _ => None,
        })
    }

    /// Tuning steps with their status, in output order
    pub fn tuning_steps(&self) -> Vec<(&str, Option<&Status>)> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Step { what, status } if what != INITIALIZING && what != WAITING => {
                    Some((what.as_str(), status.as_ref()))
                }
                _ => None,
            })
            .collect()
    }

    /// Number of listen windows opened
    pub fn prompt_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, Line::Step { what, .. } if what == WAITING))
            .count()
    }

    /// Group completed listen windows with the lines that follow them.
    ///
    /// Fails on the first window that breaks the output rules: a success
    /// must be followed by Data, RSSI and SNR in order, and nothing else may
    /// be followed by any of them.
    pub fn receptions(&self) -> Result<Vec<Reception>, String> {
        let mut receptions = Vec::new();
        let mut i = 0;

        while i < self.lines.len() {
            let status = match &self.lines[i] {
                Line::Step {
                    what,
                    status: Some(status),
                } if what == WAITING => status.clone(),
                Line::Data(_) | Line::Rssi(_) | Line::Snr(_) if !receptions.is_empty() => {
                    return Err(format!("line {}: packet detail without a success", i + 1));
                }
                _ => {
                    i += 1;
                    continue;
                }
            };

            if status != Status::Success {
                receptions.push(Reception {
                    status,
                    data: None,
                    rssi: None,
                    snr: None,
                });
                i += 1;
                continue;
            }

            let rest = &self.lines[i + 1..];
            if rest.len() < 3 {
                // Capture ended mid-report
                break;
            }
            match (&rest[0], &rest[1], &rest[2]) {
                (Line::Data(data), Line::Rssi(rssi), Line::Snr(snr)) => {
                    receptions.push(Reception {
                        status,
                        data: Some(data.clone()),
                        rssi: Some(*rssi),
                        snr: Some(*snr),
                    });
                    i += 4;
                }
                _ => {
                    return Err(format!(
                        "line {}: success not followed by Data, RSSI, SNR",
                        i + 1
                    ))
                }
            }
        }

        Ok(receptions)
    }
}
