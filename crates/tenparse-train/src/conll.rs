//! CoNLL-U reading and writing
//!
//! Only FORM, UPOS, HEAD and DEPREL are read. Comment lines, multiword token
//! ranges (`3-4`) and empty nodes (`5.1`) are skipped, and every sentence gets
//! the artificial root token prepended. The language code is not part of the
//! format and is supplied per file.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tenparse_features::Sentence;

const FORM: usize = 1;
const UPOS: usize = 3;
const HEAD: usize = 6;
const DEPREL: usize = 7;
const COLUMNS: usize = 10;

/// Read every sentence of a CoNLL-U stream
pub fn read_conll<R: BufRead>(reader: R, language: &str) -> Result<Vec<Sentence>> {
    let mut sentences = Vec::new();
    let mut current = Sentence::new(language);

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", index + 1))?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('*') {
            if !current.is_empty() {
                sentences.push(std::mem::replace(&mut current, Sentence::new(language)));
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() <= DEPREL {
            bail!(
                "line {}: expected {} tab-separated columns, found {}",
                index + 1,
                COLUMNS,
                fields.len()
            );
        }
        if fields[0].contains('-') || fields[0].contains('.') {
            continue;
        }
        let head: i32 = fields[HEAD]
            .parse()
            .with_context(|| format!("line {}: bad HEAD {:?}", index + 1, fields[HEAD]))?;
        current.push(fields[FORM], fields[UPOS], head, fields[DEPREL]);
    }
    if !current.is_empty() {
        sentences.push(current);
    }

    for (i, sentence) in sentences.iter().enumerate() {
        sentence
            .validate()
            .with_context(|| format!("sentence {} is inconsistent", i + 1))?;
    }
    Ok(sentences)
}

pub fn read_conll_file<P: AsRef<Path>>(path: P, language: &str) -> Result<Vec<Sentence>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_conll(BufReader::new(file), language).with_context(|| format!("parsing {}", path.display()))
}

/// Write one sentence (root token excluded) followed by a blank line
pub fn write_sentence<W: Write>(writer: &mut W, sentence: &Sentence) -> Result<()> {
    for i in 1..sentence.len() {
        writeln!(
            writer,
            "{}\t{}\t_\t{}\t_\t_\t{}\t{}\t_\t_",
            i, sentence.forms[i], sentence.tags[i], sentence.heads[i], sentence.labels[i]
        )?;
    }
    writeln!(writer)?;
    Ok(())
}

pub fn write_conll<W: Write>(mut writer: W, sentences: &[Sentence]) -> Result<()> {
    for sentence in sentences {
        write_sentence(&mut writer, sentence)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_conll_file<P: AsRef<Path>>(path: P, sentences: &[Sentence]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_conll(BufWriter::new(file), sentences)
}
