//! JSON Lines export/import of question/answer pairs. Embeddings are never
//! written; they are recomputed from the questions on load.

use crate::error::{FaqError, Result};
use crate::model::QaPair;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub fn write_pairs_jsonl<W: Write>(writer: W, pairs: &[QaPair]) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    for pair in pairs {
        serde_json::to_writer(&mut writer, pair)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_pairs_jsonl(path: &Path, pairs: &[QaPair]) -> Result<()> {
    write_pairs_jsonl(File::create(path)?, pairs)
}

/// Blank lines are ignored. Pairs with a blank question or answer are rejected.
pub fn read_pairs_jsonl<R: Read>(reader: R) -> Result<Vec<QaPair>> {
    let mut pairs = Vec::new();
    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let pair: QaPair = serde_json::from_str(&line)?;
        if pair.question.trim().is_empty() || pair.answer.trim().is_empty() {
            return Err(FaqError::InvalidInput(format!(
                "line {}: question and answer must be non-empty",
                lineno + 1
            )));
        }
        pairs.push(pair);
    }
    Ok(pairs)
}

pub fn load_pairs_jsonl(path: &Path) -> Result<Vec<QaPair>> {
    read_pairs_jsonl(File::open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_object_per_line() {
        let mut out = Vec::new();
        write_pairs_jsonl(&mut out, &[QaPair::new("hi", "hello")]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"question\":\"hi\",\"answer\":\"hello\"}\n"
        );
    }

    #[test]
    fn file_round_trip_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.jsonl");
        let pairs = vec![QaPair::new("a", "1"), QaPair::new("b", "2")];
        save_pairs_jsonl(&path, &pairs).unwrap();

        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("\n   \n");
        std::fs::write(&path, text).unwrap();

        assert_eq!(load_pairs_jsonl(&path).unwrap(), pairs);
    }

    #[test]
    fn rejects_blank_answers_and_bad_json() {
        let blank = "{\"question\":\"q\",\"answer\":\" \"}\n";
        let err = read_pairs_jsonl(blank.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));

        assert!(matches!(
            read_pairs_jsonl("not json\n".as_bytes()),
            Err(FaqError::Json(_))
        ));
    }
}
