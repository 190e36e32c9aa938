//! Journal file format
//!
//! The journal starts with a five line header (magic, format version, app
//! version, value count, blank line) followed by one record per line.

use crate::error::{Result, StoreError};
use std::fmt;
use std::io::{self, Read, Write};

pub(crate) const JOURNAL_FILE: &str = "journal";
pub(crate) const JOURNAL_FILE_TEMP: &str = "journal.tmp";
pub(crate) const JOURNAL_FILE_BACKUP: &str = "journal.bkp";

const MAGIC: &str = "libcore.io.DiskLruCache";
const FORMAT_VERSION: &str = "1";

const CLEAN: &str = "CLEAN";
const DIRTY: &str = "DIRTY";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct JournalHeader {
    pub app_version: u32,
    pub value_count: usize,
}

impl JournalHeader {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(
            writer,
            "{}\n{}\n{}\n{}\n\n",
            MAGIC, FORMAT_VERSION, self.app_version, self.value_count
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JournalRecord {
    /// An edit was committed; carries the length of every value
    Clean { key: String, lengths: Vec<u64> },
    /// An edit started; must be followed by CLEAN or REMOVE
    Dirty { key: String },
    Remove { key: String },
    Read { key: String },
}

impl JournalRecord {
    fn parse(line: &str, value_count: usize) -> Result<Self> {
        let mut parts = line.split(' ');
        let op = parts.next().unwrap_or_default();
        let key = match parts.next() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return Err(unexpected_line(line)),
        };

        let record = match op {
            CLEAN => {
                let lengths = parts
                    .map(|part| part.parse::<u64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| unexpected_line(line))?;
                if lengths.len() != value_count {
                    return Err(unexpected_line(line));
                }
                return Ok(JournalRecord::Clean { key, lengths });
            }
            DIRTY => JournalRecord::Dirty { key },
            REMOVE => JournalRecord::Remove { key },
            READ => JournalRecord::Read { key },
            _ => return Err(unexpected_line(line)),
        };

        if parts.next().is_some() {
            return Err(unexpected_line(line));
        }
        Ok(record)
    }
}

impl fmt::Display for JournalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalRecord::Clean { key, lengths } => {
                write!(f, "{} {}", CLEAN, key)?;
                for length in lengths {
                    write!(f, " {}", length)?;
                }
                Ok(())
            }
            JournalRecord::Dirty { key } => write!(f, "{} {}", DIRTY, key),
            JournalRecord::Remove { key } => write!(f, "{} {}", REMOVE, key),
            JournalRecord::Read { key } => write!(f, "{} {}", READ, key),
        }
    }
}

/// Parsed journal body
#[derive(Debug)]
pub(crate) struct Journal {
    pub records: Vec<JournalRecord>,
    /// The final line was cut short, most likely by a crash mid-append
    pub truncated: bool,
}

/// Read and validate a journal against the header the caller expects
pub(crate) fn read_journal<R: Read>(mut reader: R, expected: &JournalHeader) -> Result<Journal> {
    let mut content = String::new();
    reader.read_to_string(&mut content).map_err(|err| {
        if err.kind() == io::ErrorKind::InvalidData {
            StoreError::CorruptJournal("journal is not valid UTF-8".to_string())
        } else {
            StoreError::from(err)
        }
    })?;

    let mut lines: Vec<&str> = content.split('\n').collect();
    // A complete journal ends with '\n', leaving an empty final element
    let truncated = match lines.pop() {
        Some("") => false,
        Some(_) => true,
        None => false,
    };

    if lines.len() < 5 {
        return Err(StoreError::CorruptJournal(
            "journal header is incomplete".to_string(),
        ));
    }

    let app_version = expected.app_version.to_string();
    let value_count = expected.value_count.to_string();
    if lines[0] != MAGIC
        || lines[1] != FORMAT_VERSION
        || lines[2] != app_version
        || lines[3] != value_count
        || !lines[4].is_empty()
    {
        return Err(StoreError::CorruptJournal(format!(
            "unexpected journal header: [{}, {}, {}, {}, {}]",
            lines[0], lines[1], lines[2], lines[3], lines[4]
        )));
    }

    let records = lines[5..]
        .iter()
        .map(|line| JournalRecord::parse(line, expected.value_count))
        .collect::<Result<Vec<_>>>()?;

    Ok(Journal { records, truncated })
}

fn unexpected_line(line: &str) -> StoreError {
    StoreError::CorruptJournal(format!("unexpected journal line: {}", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> JournalHeader {
        JournalHeader {
            app_version: 1,
            value_count: 1,
        }
    }

    fn journal_text(body: &str) -> String {
        let mut text = Vec::new();
        header().write_to(&mut text).unwrap();
        let mut text = String::from_utf8(text).unwrap();
        text.push_str(body);
        text
    }

    #[test]
    fn test_record_display() {
        let clean = JournalRecord::Clean {
            key: "k1".to_string(),
            lengths: vec![10],
        };
        assert_eq!(clean.to_string(), "CLEAN k1 10");
        assert_eq!(
            JournalRecord::Dirty {
                key: "k1".to_string()
            }
            .to_string(),
            "DIRTY k1"
        );
    }

    #[test]
    fn test_read_journal_records() {
        let text = journal_text("DIRTY k1\nCLEAN k1 5\nREAD k1\nREMOVE k1\n");
        let journal = read_journal(text.as_bytes(), &header()).unwrap();

        assert!(!journal.truncated);
        assert_eq!(journal.records.len(), 4);
        assert_eq!(
            journal.records[1],
            JournalRecord::Clean {
                key: "k1".to_string(),
                lengths: vec![5]
            }
        );
    }

    #[test]
    fn test_truncated_last_line_is_dropped() {
        let text = journal_text("DIRTY k1\nCLEAN k1 5\nDIR");
        let journal = read_journal(text.as_bytes(), &header()).unwrap();

        assert!(journal.truncated);
        assert_eq!(journal.records.len(), 2);
    }

    #[test]
    fn test_app_version_mismatch_is_corrupt() {
        let text = journal_text("");
        let expected = JournalHeader {
            app_version: 2,
            value_count: 1,
        };
        let err = read_journal(text.as_bytes(), &expected).unwrap_err();
        assert!(matches!(err, StoreError::CorruptJournal(_)));
    }

    #[test]
    fn test_clean_record_with_wrong_value_count_is_corrupt() {
        let text = journal_text("CLEAN k1 5 6\n");
        assert!(read_journal(text.as_bytes(), &header()).is_err());
    }

    #[test]
    fn test_unknown_operation_is_corrupt() {
        let text = journal_text("UPDATE k1\n");
        assert!(read_journal(text.as_bytes(), &header()).is_err());
    }
}
