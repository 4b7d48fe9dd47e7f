//! Channel table loaded from the channel configuration file.
//!
//! One channel per line, three comma-separated fields:
//!
//! ```text
//! # id, frequency (Hz), transport stream id
//! 27, 557142857, 32736
//! "28", 563142857, 32737
//! ```
//!
//! Fields follow escaped-list rules: `"` toggles quoting so that commas can
//! be embedded, and `\` escapes `\`, `"` and `n`. Surrounding whitespace of
//! each field is trimmed. Blank lines and lines starting with `#` are
//! ignored; lines that cannot be parsed are skipped with a warning.

use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};
use nom::branch::alt;
use nom::bytes::complete::is_not;
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, value};
use nom::multi::{fold_many0, separated_list1};
use nom::sequence::{delimited, preceded};
use nom::IResult;
use thiserror::Error;

/// Number of fields on every channel line.
const FIELD_COUNT: usize = 3;

/// Tuning parameters of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub id: i32,
    /// Carrier frequency programmed into the frontend.
    pub frequency: u32,
    /// Stream identifier programmed alongside the frequency.
    pub transport_stream_id: u32,
}

/// Reasons a channel line is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelParseError {
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),

    #[error("unterminated quote or invalid escape sequence")]
    Syntax,

    #[error("field '{field}' is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Immutable map from channel id to tuning parameters.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    channels: HashMap<i32, Channel>,
}

impl ChannelTable {
    /// Read and parse a channel configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse channel configuration text.
    ///
    /// When an id appears more than once the first definition is kept.
    pub fn parse(content: &str) -> Self {
        let mut channels = HashMap::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Ok(channel) => {
                    if channels.contains_key(&channel.id) {
                        debug!("Duplicate channel {} ignored: {}", channel.id, line);
                        continue;
                    }
                    channels.insert(channel.id, channel);
                }
                Err(e) => warn!("Invalid channel line ({}), ignored: {}", e, line),
            }
        }

        Self { channels }
    }

    pub fn get(&self, id: i32) -> Option<&Channel> {
        self.channels.get(&id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl FromIterator<Channel> for ChannelTable {
    fn from_iter<T: IntoIterator<Item = Channel>>(iter: T) -> Self {
        let mut channels = HashMap::new();
        for channel in iter {
            channels.entry(channel.id).or_insert(channel);
        }
        Self { channels }
    }
}

/// Parse a single `id,frequency,transport_stream_id` line.
pub fn parse_line(line: &str) -> Result<Channel, ChannelParseError> {
    let (_, fields) = fields(line).map_err(|_| ChannelParseError::Syntax)?;
    if fields.len() != FIELD_COUNT {
        return Err(ChannelParseError::FieldCount(fields.len()));
    }

    Ok(Channel {
        id: parse_field("id", &fields[0])?,
        frequency: parse_field("frequency", &fields[1])?,
        transport_stream_id: parse_field("transport_stream_id", &fields[2])?,
    })
}

fn parse_field<T: std::str::FromStr>(
    field: &'static str,
    raw: &str,
) -> Result<T, ChannelParseError> {
    let trimmed = raw.trim();
    trimmed.parse().map_err(|_| ChannelParseError::InvalidNumber {
        field,
        value: trimmed.to_string(),
    })
}

fn escaped(input: &str) -> IResult<&str, char> {
    preceded(
        char('\\'),
        alt((
            value('\\', char('\\')),
            value('"', char('"')),
            value('\n', char('n')),
        )),
    )(input)
}

fn quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        fold_many0(
            alt((map(is_not("\"\\"), String::from), map(escaped, String::from))),
            String::new,
            concat,
        ),
        char('"'),
    )(input)
}

fn unquoted(input: &str) -> IResult<&str, String> {
    alt((map(is_not(",\"\\"), String::from), map(escaped, String::from)))(input)
}

fn field(input: &str) -> IResult<&str, String> {
    fold_many0(alt((quoted, unquoted)), String::new, concat)(input)
}

fn fields(input: &str) -> IResult<&str, Vec<String>> {
    all_consuming(separated_list1(char(','), field))(input)
}

fn concat(mut acc: String, part: String) -> String {
    acc.push_str(&part);
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_line() {
        let ch = parse_line("27,557142857,32736").unwrap();
        assert_eq!(
            ch,
            Channel {
                id: 27,
                frequency: 557142857,
                transport_stream_id: 32736,
            }
        );
    }

    #[test]
    fn test_parse_trims_and_unquotes() {
        let ch = parse_line(r#" "13" , 473142857 ,  "0" "#).unwrap();
        assert_eq!(ch.id, 13);
        assert_eq!(ch.frequency, 473142857);
        assert_eq!(ch.transport_stream_id, 0);
    }

    #[test]
    fn test_quoted_comma_stays_in_field() {
        assert_eq!(
            fields(r#"a,"b,c",d"#).unwrap().1,
            vec!["a".to_string(), "b,c".to_string(), "d".to_string()]
        );
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(
            fields(r#"a\"b,c\\d,\n"#).unwrap().1,
            vec!["a\"b".to_string(), "c\\d".to_string(), "\n".to_string()]
        );
    }

    #[test]
    fn test_empty_fields_are_kept() {
        assert_eq!(fields("1,,3").unwrap().1.len(), 3);
        assert_eq!(
            parse_line("1,,3"),
            Err(ChannelParseError::InvalidNumber {
                field: "frequency",
                value: String::new(),
            })
        );
    }

    #[test]
    fn test_wrong_field_count() {
        assert_eq!(parse_line("1,2"), Err(ChannelParseError::FieldCount(2)));
        assert_eq!(parse_line("1,2,3,4"), Err(ChannelParseError::FieldCount(4)));
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(parse_line(r#""1,2,3"#), Err(ChannelParseError::Syntax));
        assert_eq!(parse_line(r#"1\x,2,3"#), Err(ChannelParseError::Syntax));
    }

    #[test]
    fn test_non_numeric_field() {
        assert!(matches!(
            parse_line("one,2,3"),
            Err(ChannelParseError::InvalidNumber { field: "id", .. })
        ));
        assert!(matches!(
            parse_line("1,-2,3"),
            Err(ChannelParseError::InvalidNumber { field: "frequency", .. })
        ));
    }

    #[test]
    fn test_table_skips_malformed_lines() {
        let table = ChannelTable::parse(
            "# id,frequency,tsid\n\
             27,557142857,32736\n\
             broken line\n\
             \n\
             28,abc,1\n\
             29,563142857,32737,9\n\
             -1,473142857,0\n",
        );
        assert_eq!(table.len(), 2);
        assert!(table.get(27).is_some());
        assert_eq!(table.get(-1).unwrap().frequency, 473142857);
        assert!(table.get(28).is_none());
        assert!(table.get(29).is_none());
    }

    #[test]
    fn test_duplicate_id_keeps_first() {
        let table = ChannelTable::parse("7,100,1\n7,200,2\n");
        assert_eq!(table.len(), 1);
        let ch = table.get(7).unwrap();
        assert_eq!(ch.frequency, 100);
        assert_eq!(ch.transport_stream_id, 1);
    }

    #[test]
    fn test_from_iter_keeps_first() {
        let table: ChannelTable = vec![
            Channel { id: 7, frequency: 100, transport_stream_id: 1 },
            Channel { id: 7, frequency: 200, transport_stream_id: 2 },
        ]
        .into_iter()
        .collect();
        assert_eq!(table.get(7).unwrap().frequency, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"13,473142857,0\n").unwrap();
        let table = ChannelTable::load(file.path()).unwrap();
        assert_eq!(table.len(), 1);
    }
}
