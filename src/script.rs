use std::path::Path;
use thiserror::Error;

const DEFAULT_GAP_S: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("failed reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("line {line}: bad delay '{token}' (expected +<seconds>)")]
    Delay { line: usize, token: String },
    #[error("no fragment lines found")]
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    at_s: f32,
    text: String,
}

#[derive(Clone, Debug)]
pub struct FragmentScript {
    entries: Vec<Entry>,
    span_s: f32,
}

impl FragmentScript {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ScriptError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&raw)
    }

    pub fn builtin() -> Self {
        let lines = [
            "the signal remembers you",
            "every word is a small light",
            "read me before I drift away",
            "static gathers at the edges",
            "listen: the room is breathing",
            "we were here, we were clear",
            "nothing stays legible forever",
            "hold the shape of the sentence",
        ];
        let entries: Vec<Entry> = lines
            .iter()
            .enumerate()
            .map(|(i, text)| Entry {
                at_s: i as f32 * DEFAULT_GAP_S,
                text: text.to_string(),
            })
            .collect();
        let span_s = lines.len() as f32 * DEFAULT_GAP_S;
        Self { entries, span_s }
    }

    pub fn parse(input: &str) -> Result<Self, ScriptError> {
        let mut entries = Vec::new();
        let mut at_s = 0.0f32;
        for (idx, raw) in input.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (delay, text) = split_delay(line, idx + 1)?;
            if text.is_empty() {
                continue;
            }
            if !entries.is_empty() || delay.is_some() {
                at_s += delay.unwrap_or(DEFAULT_GAP_S);
            }
            entries.push(Entry {
                at_s,
                text: text.to_string(),
            });
        }
        if entries.is_empty() {
            return Err(ScriptError::Empty);
        }
        Ok(Self {
            entries,
            span_s: at_s + DEFAULT_GAP_S,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn span_s(&self) -> f32 {
        self.span_s
    }

    /// Lines that spawn in `[from_s, to_s)`. Looping replays the script every
    /// `span_s`.
    pub fn due(&self, from_s: f32, to_s: f32, looped: bool) -> Vec<&str> {
        if self.entries.is_empty() || !(to_s > from_s) {
            return Vec::new();
        }
        let (first, last) = if looped {
            let pass = |t: f32| (t / self.span_s).floor().max(0.0) as u64;
            (pass(from_s), pass(to_s))
        } else {
            (0, 0)
        };
        let mut out = Vec::new();
        for pass in first..=last {
            let offset = pass as f32 * self.span_s;
            out.extend(
                self.entries
                    .iter()
                    .filter(|e| (from_s..to_s).contains(&(e.at_s + offset)))
                    .map(|e| e.text.as_str()),
            );
        }
        out
    }
}

// `+<seconds> text` delays a line after the previous one; plain lines use the default gap.
fn split_delay(line: &str, line_no: usize) -> Result<(Option<f32>, &str), ScriptError> {
    let Some(rest) = line.strip_prefix('+') else {
        return Ok((None, line));
    };
    let (token, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    match token.trim_end_matches('s').parse::<f32>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok((Some(secs), text.trim())),
        _ => Err(ScriptError::Delay {
            line: line_no,
            token: format!("+{token}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_accumulate_from_the_previous_line() {
        let script = FragmentScript::parse("one\n+0.5 two\nthree\n+1s four").unwrap();
        let times: Vec<f32> = script.entries.iter().map(|e| e.at_s).collect();
        assert_eq!(times, vec![0.0, 0.5, 2.5, 3.5]);
        assert_eq!(script.span_s(), 5.5);
    }

    #[test]
    fn leading_delay_applies_to_the_first_line() {
        let script = FragmentScript::parse("# intro\n+3 late start").unwrap();
        assert_eq!(script.entries[0].at_s, 3.0);
    }

    #[test]
    fn bad_delays_report_their_line() {
        let err = FragmentScript::parse("ok\n+soon later").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Delay {
                line: 2,
                token: "+soon".to_string()
            }
        );
        assert!(FragmentScript::parse("+-1 back in time").is_err());
    }

    #[test]
    fn builtin_lines_fill_one_pass() {
        let script = FragmentScript::builtin();
        assert_eq!(script.len(), 8);
        assert_eq!(script.due(0.0, script.span_s(), false).len(), 8);
    }
}
