use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Binary depression risk class. The discriminant is the class index used by
/// the one-hot labels and the classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLabel {
    Low = 0,
    High = 1,
}

impl RiskLabel {
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(RiskLabel::Low),
            1 => Some(RiskLabel::High),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::Low => "LOW",
            RiskLabel::High => "HIGH",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of an AVEC 2017 split file.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelRecord {
    #[serde(rename = "Participant_ID", alias = "participant_ID")]
    pub participant_id: u32,

    /// 1 when the PHQ-8 score is at or above the screening cut-off
    #[serde(rename = "PHQ8_Binary")]
    pub phq8_binary: u8,

    #[serde(rename = "PHQ8_Score", default)]
    pub phq8_score: Option<u32>,

    #[serde(rename = "Gender", alias = "gender", default)]
    pub gender: Option<u8>,
}

/// Label table for one split, indexed by participant.
#[derive(Debug, Clone)]
pub struct LabelTable {
    records: Vec<LabelRecord>,
    /// participant id -> index of its first row
    index: HashMap<u32, usize>,
}

/// `<base>/Labels/<split>_split_Depression_AVEC2017.csv`
pub fn label_table_path(base: &Path, split: &str) -> PathBuf {
    base.join("Labels")
        .join(format!("{split}_split_Depression_AVEC2017.csv"))
}

/// `<base>/audio/<id>_AUDIO.wav`, if that file exists.
pub fn audio_path(base: &Path, participant_id: u32) -> Option<PathBuf> {
    let path = base
        .join("audio")
        .join(format!("{participant_id}_AUDIO.wav"));
    path.is_file().then_some(path)
}

impl LabelTable {
    pub fn load(base: &Path, split: &str) -> Result<Self> {
        let path = label_table_path(base, split);
        if !path.is_file() {
            return Err(Error::LabelTableNotFound(path));
        }
        let file = std::fs::File::open(&path)?;
        Self::from_reader(file).map_err(|source| Error::InvalidLabelTable { path, source })
    }

    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let records = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<LabelRecord>, _>>()?;

        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            index.entry(record.participant_id).or_insert(i);
        }
        Ok(Self { records, index })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[LabelRecord] {
        &self.records
    }

    pub fn get(&self, participant_id: u32) -> Option<&LabelRecord> {
        self.index.get(&participant_id).map(|&i| &self.records[i])
    }

    /// Raw `PHQ8_Binary` value of the participant's first row.
    pub fn label_for(&self, participant_id: u32) -> Option<u8> {
        self.get(participant_id).map(|r| r.phq8_binary)
    }

    /// Descriptive statistics over every row.
    pub fn summary(&self) -> DatasetSummary {
        let mut summary = DatasetSummary {
            rows: self.records.len(),
            score_histogram: vec![0; SCORE_BINS],
            ..Default::default()
        };
        for record in &self.records {
            *summary.label_counts.entry(record.phq8_binary).or_default() += 1;
            if let Some(gender) = record.gender {
                *summary.gender_counts.entry(gender).or_default() += 1;
            }
            if let Some(score) = record.phq8_score {
                summary.score_histogram[score_bin(score)] += 1;
            }
        }
        summary
    }
}

const SCORE_BINS: usize = 10;
/// PHQ-8 totals range over 0..=24
const MAX_SCORE: f64 = 24.0;

fn score_bin(score: u32) -> usize {
    let width = MAX_SCORE / SCORE_BINS as f64;
    ((score as f64 / width) as usize).min(SCORE_BINS - 1)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: usize,
    /// PHQ8_Binary value -> row count
    pub label_counts: BTreeMap<u8, usize>,
    /// Gender code -> row count
    pub gender_counts: BTreeMap<u8, usize>,
    /// PHQ8_Score counts in ten equal bins over 0..=24
    pub score_histogram: Vec<usize>,
}
