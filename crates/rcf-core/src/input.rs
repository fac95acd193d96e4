//! Point parsing for the CLI.
//!
//! One point per line. Coordinates are separated by commas and/or
//! whitespace, or the whole line is a JSON array. Blank lines and lines
//! starting with `#` are skipped. Values are parsed, not validated: `NaN`
//! parses so the forest can reject it with a coordinate index.

use std::io::BufRead;

use rcf_common::{Error, Result};

/// A parsed point and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPoint {
    pub line: usize,
    pub values: Vec<f64>,
}

/// Parse one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(text: &str, line: usize) -> Result<Option<Vec<f64>>> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<f64>>(trimmed)
            .map(Some)
            .map_err(|e| Error::InputParse {
                line,
                message: e.to_string(),
            });
    }

    let values = trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse::<f64>().map_err(|_| Error::InputParse {
                line,
                message: format!("not a number: {:?}", token),
            })
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.is_empty() {
        return Err(Error::InputParse {
            line,
            message: "no values".to_string(),
        });
    }
    Ok(Some(values))
}

/// Read every point from `reader`. Stops at the first parse error.
pub fn read_points<R: BufRead>(reader: R) -> Result<Vec<InputPoint>> {
    let mut points = Vec::new();
    for item in PointReader::new(reader) {
        points.push(item?);
    }
    Ok(points)
}

/// Lazy line-by-line point iterator, for streaming input.
pub struct PointReader<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> PointReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for PointReader<R> {
    type Item = Result<InputPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            self.line += 1;
            match parse_line(&text, self.line) {
                Ok(Some(values)) => {
                    return Some(Ok(InputPoint {
                        line: self.line,
                        values,
                    }))
                }
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Flatten single-coordinate points into a scalar series.
pub fn scalars(points: &[InputPoint]) -> Result<Vec<f64>> {
    points
        .iter()
        .map(|p| match p.values.as_slice() {
            [x] => Ok(*x),
            other => Err(Error::InputParse {
                line: p.line,
                message: format!("expected one value per line, got {}", other.len()),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators() {
        assert_eq!(parse_line("1, 2,3", 1).unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(parse_line("1 2\t3", 1).unwrap(), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(parse_line(" -1.5e3 ", 1).unwrap(), Some(vec![-1500.0]));
    }

    #[test]
    fn json_array_line() {
        assert_eq!(parse_line("[0.5, 2]", 1).unwrap(), Some(vec![0.5, 2.0]));
        assert!(parse_line("[0.5, \"x\"]", 4).is_err());
    }

    #[test]
    fn skips_blank_and_comments() {
        assert_eq!(parse_line("", 1).unwrap(), None);
        assert_eq!(parse_line("   ", 1).unwrap(), None);
        assert_eq!(parse_line("# header", 1).unwrap(), None);
    }

    #[test]
    fn nan_is_parsed_not_rejected() {
        let v = parse_line("1,NaN", 1).unwrap().unwrap();
        assert!(v[1].is_nan());
    }

    #[test]
    fn bad_token_reports_line() {
        let err = parse_line("1,abc", 7).unwrap_err();
        match err {
            Error::InputParse { line, message } => {
                assert_eq!(line, 7);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_line(",,", 1).is_err());
    }

    #[test]
    fn reader_tracks_source_lines() {
        let text = "# points\n1,2\n\n3,4\n";
        let points = read_points(text.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].line, 2);
        assert_eq!(points[1].line, 4);
        assert_eq!(points[1].values, vec![3.0, 4.0]);
    }

    #[test]
    fn scalars_require_one_value() {
        let points = read_points("1\n2\n".as_bytes()).unwrap();
        assert_eq!(scalars(&points).unwrap(), vec![1.0, 2.0]);
        let wide = read_points("1\n2,3\n".as_bytes()).unwrap();
        assert!(scalars(&wide).is_err());
    }
}
