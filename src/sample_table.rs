//! The sample-by-taxon count table reader (component **R**, §4.2).
//!
//! Taxon names are discovered once from the header; data rows are indexed
//! by byte offset and parsed on demand rather than materialized all at
//! once, so a caller can hold a handle to a multi-gigabyte count table
//! while only ever keeping `maxVecs` rows' worth of vectors in memory (the
//! engine's blocked streaming driver relies on this).

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use rand::Rng;
use rand_distr::{Distribution, WeightedIndex};

use crate::error::{BetaDivError, InputFormatError};

/// One sample's counts, aligned with [`SampleTable::taxa`]'s column order,
/// plus the row's total count.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCounts {
    /// Per-taxon counts (or proportions, if the source row held floats),
    /// aligned with the table's taxon column order.
    pub counts: Vec<f64>,
    /// Sum of `counts`.
    pub total: f64,
}

/// Random-access reader over a tab-separated sample×taxon count table.
pub struct SampleTable<S> {
    source: S,
    taxa: Vec<String>,
    sample_names: Vec<String>,
    row_offsets: Vec<u64>,
}

impl SampleTable<BufReader<File>> {
    /// Open a sample table from a file path, indexing every row's byte
    /// offset for later random access.
    pub fn open(path: &Path) -> Result<Self, BetaDivError> {
        let file = File::open(path).map_err(|e| BetaDivError::io(path, e))?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<S: Read + Seek> SampleTable<S> {
    /// Build a table over any seekable reader: reads and discards the
    /// header line, then scans forward recording the byte offset of every
    /// subsequent non-empty line.
    pub fn from_reader(mut source: S) -> Result<Self, BetaDivError> {
        let mut buffered = BufReader::new(&mut source);
        let mut header_line = String::new();
        let header_len = buffered
            .read_line(&mut header_line)
            .map_err(|e| BetaDivError::io("<sample table>", e))?;
        if header_len == 0 {
            return Err(InputFormatError::EmptyTable.into());
        }

        let taxa = parse_header(&header_line)?;

        let mut row_offsets = Vec::new();
        let mut sample_names = Vec::new();
        let mut offset = header_len as u64;
        loop {
            let mut line = String::new();
            let read = buffered
                .read_line(&mut line)
                .map_err(|e| BetaDivError::io("<sample table>", e))?;
            if read == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if !trimmed.is_empty() {
                let name = trimmed
                    .split('\t')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                sample_names.push(name);
                row_offsets.push(offset);
            }
            offset += read as u64;
        }

        drop(buffered);
        Ok(Self {
            source,
            taxa,
            sample_names,
            row_offsets,
        })
    }

    /// Taxon names, in header (column) order.
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    /// Sample names, in row order.
    pub fn sample_names(&self) -> &[String] {
        &self.sample_names
    }

    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.sample_names.len()
    }

    /// Read sample `index`'s counts. Seeks to the row's indexed byte
    /// offset and reparses it; reading the same index twice returns
    /// identical data.
    pub fn read_row(&mut self, index: usize) -> Result<SampleCounts, BetaDivError> {
        let offset = self.row_offsets[index];
        self.source
            .seek(SeekFrom::Start(offset))
            .map_err(|e| BetaDivError::io("<sample table>", e))?;
        let mut reader = BufReader::new(&mut self.source);
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| BetaDivError::io("<sample table>", e))?;
        parse_row(&line, index, self.taxa.len())
    }

    /// Read sample `index`'s counts, jackknife-resampled to `draw_size`:
    /// `draw_size` independent draws with replacement from the multinomial
    /// defined by the row's raw counts.
    pub fn read_row_jackknife(
        &mut self,
        index: usize,
        draw_size: usize,
        rng: &mut impl Rng,
    ) -> Result<SampleCounts, BetaDivError> {
        let row = self.read_row(index)?;
        Ok(jackknife_resample(&row, draw_size, rng))
    }
}

/// Parse the header line: trim surrounding whitespace off each cell,
/// discard the unused leading (sample-name) column, reject duplicate taxon
/// names.
fn parse_header(header_line: &str) -> Result<Vec<String>, BetaDivError> {
    let trimmed = header_line.trim_end_matches(['\n', '\r']);
    let mut cells = trimmed.split('\t');
    cells.next(); // unused leading cell

    let mut taxa = Vec::new();
    let mut seen = HashSet::new();
    for cell in cells {
        let name = cell.trim().to_string();
        if !seen.insert(name.clone()) {
            return Err(InputFormatError::DuplicateTaxon(name).into());
        }
        taxa.push(name);
    }
    Ok(taxa)
}

/// Parse a data row: sample name, then one numeric value per taxon.
fn parse_row(line: &str, row: usize, expected_taxa: usize) -> Result<SampleCounts, BetaDivError> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let mut cells = trimmed.split('\t');
    cells.next(); // sample name, already known from the index pass

    let mut counts = Vec::with_capacity(expected_taxa);
    for cell in cells {
        let value: f64 = cell
            .trim()
            .parse()
            .map_err(|source| InputFormatError::Numeric {
                value: cell.to_string(),
                source,
            })?;
        counts.push(value);
    }

    if counts.len() != expected_taxa {
        return Err(InputFormatError::RowColumnMismatch {
            row,
            found: counts.len(),
            expected: expected_taxa,
        }
        .into());
    }

    let total = counts.iter().sum();
    Ok(SampleCounts { counts, total })
}

/// Draw `draw_size` samples with replacement from the multinomial defined
/// by `row.counts`, returning the resulting counts and their sum
/// (`draw_size`, unless every weight was zero).
fn jackknife_resample(row: &SampleCounts, draw_size: usize, rng: &mut impl Rng) -> SampleCounts {
    let mut counts = vec![0.0; row.counts.len()];
    if row.total <= 0.0 || draw_size == 0 {
        return SampleCounts { counts, total: 0.0 };
    }

    let dist = WeightedIndex::new(&row.counts).expect("at least one positive weight");
    for _ in 0..draw_size {
        let taxon = dist.sample(rng);
        counts[taxon] += 1.0;
    }
    SampleCounts {
        total: counts.iter().sum(),
        counts,
    }
}
