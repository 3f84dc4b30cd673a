use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use derive_new::new;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use xz2::read::XzDecoder;

use crate::{pipelines::sequence_classification::virality, utils::download::download_once};

use super::DatasetError;

/// The name of the tweet dataset
pub static DATASET: &str = "tweets";

/// The default source for the tweet dataset
pub static DEFAULT_URL: &str = "https://users.aalto.fi/~les1/all_tweets.json.xz";

/// Metadata columns available as side features, in their canonical order
pub static FEATURES: &[&str] = &[
    "created_at_dayofweek",
    "created_at_hour",
    "hashtags_count",
    "mentions_count",
    "cashtags_count",
    "is_quote_tweet",
];

/// A tweet prepared for virality classification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Item {
    /// The tweet body
    pub text: String,

    /// Side features, in the configured feature order
    pub features: Vec<i32>,

    /// The virality class id
    pub label: usize,
}

impl virality::Item for Item {
    fn input(&self) -> &str {
        &self.text
    }

    fn features(&self) -> &[i32] {
        &self.features
    }

    fn class_id(&self) -> usize {
        self.label
    }
}

/// Virality classes, bucketed by retweet count
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Virality {
    /// No retweets
    None,

    /// 1 to 9 retweets
    Low,

    /// 10 to 99 retweets
    Medium,

    /// 100 or more retweets
    High,
}

impl Virality {
    /// All classes in class id order
    pub const ALL: [Virality; 4] = [
        Virality::None,
        Virality::Low,
        Virality::Medium,
        Virality::High,
    ];

    /// Bin a retweet count into [0, 1), [1, 10), [10, 100) or [100, ∞)
    pub fn from_retweets(count: u64) -> Self {
        match count {
            0 => Virality::None,
            1..=9 => Virality::Low,
            10..=99 => Virality::Medium,
            _ => Virality::High,
        }
    }

    /// The ordinal class id
    pub fn class_id(self) -> usize {
        self as usize
    }

    /// The human readable retweet range
    pub fn label(self) -> &'static str {
        match self {
            Virality::None => "0",
            Virality::Low => "1-9",
            Virality::Medium => "10-99",
            Virality::High => "100+",
        }
    }

    /// Class labels for the training configuration
    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|v| v.label().to_string()).collect()
    }
}

/// A raw line of the dataset
#[derive(Debug, Deserialize)]
struct Record {
    tweet: String,
    retweets_count: u64,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

/// Parse a single JSON line into an item, extracting the given feature columns
pub fn parse_line(line: &str, line_no: usize, features: &[String]) -> Result<Item, DatasetError> {
    let record: Record = serde_json::from_str(line).map_err(|source| DatasetError::Parse {
        line: line_no,
        source,
    })?;

    let values = features
        .iter()
        .map(|feature| feature_value(&record.extra, feature, line_no))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Item {
        text: record.tweet,
        features: values,
        label: Virality::from_retweets(record.retweets_count).class_id(),
    })
}

fn feature_value(
    extra: &BTreeMap<String, Value>,
    feature: &str,
    line: usize,
) -> Result<i32, DatasetError> {
    let invalid = |value: &Value| DatasetError::InvalidFeature {
        line,
        feature: feature.to_string(),
        value: value.clone(),
    };

    match extra.get(feature) {
        None | Some(Value::Null) => Err(DatasetError::MissingFeature {
            line,
            feature: feature.to_string(),
        }),
        Some(Value::Bool(flag)) => Ok(i32::from(*flag)),
        Some(value @ Value::Number(number)) => {
            if let Some(int) = number.as_i64() {
                return i32::try_from(int).map_err(|_| invalid(value));
            }

            // pandas exports integer columns with missing values as floats
            match number.as_f64() {
                Some(float)
                    if float.fract() == 0.0
                        && float >= i32::MIN as f64
                        && float <= i32::MAX as f64 =>
                {
                    Ok(float as i32)
                }
                _ => Err(invalid(value)),
            }
        }
        Some(value) => Err(invalid(value)),
    }
}

/// Read line-delimited JSON records, skipping blank lines
pub fn read_items<R: BufRead>(reader: R, features: &[String]) -> Result<Vec<Item>, DatasetError> {
    let mut items = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        items.push(parse_line(&line, index + 1, features)?);
    }

    Ok(items)
}

/// Read a dataset file from disk, decompressing it if it is xz-encoded
pub fn read_file(path: &Path, features: &[String]) -> Result<Vec<Item>, DatasetError> {
    let file = File::open(path)?;

    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "xz") {
        Box::new(XzDecoder::new(file))
    } else {
        Box::new(file)
    };

    read_items(BufReader::new(reader), features)
}

/// The location of the cached copy of a dataset source
pub fn cache_path(data_dir: &str, url: &Url) -> PathBuf {
    let file_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or("tweets.jsonl");

    PathBuf::from(format!("{}/datasets/{}/{}", data_dir, DATASET, file_name))
}

/// Fetch the dataset (if it isn't cached yet) and load every record
pub async fn load(
    data_dir: &str,
    url: &str,
    features: &[String],
) -> Result<Vec<Item>, DatasetError> {
    let url = Url::parse(url)?;
    let path = cache_path(data_dir, &url);

    download_once(&url, &path).await?;

    let features = features.to_vec();
    let source = path.clone();
    let items = tokio::task::spawn_blocking(move || read_file(&source, &features)).await??;

    if items.is_empty() {
        return Err(DatasetError::Empty(path.display().to_string()));
    }

    log::info!("Loaded {} tweets from {}", items.len(), path.display());

    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use pretty_assertions::assert_eq;
    use xz2::write::XzEncoder;

    use super::*;

    fn features(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bins_retweet_counts() {
        let cases = [
            (0, 0),
            (1, 1),
            (9, 1),
            (10, 2),
            (99, 2),
            (100, 3),
            (250_000, 3),
        ];

        for (count, class) in cases {
            assert_eq!(Virality::from_retweets(count).class_id(), class, "{count}");
        }
    }

    #[test]
    fn parses_text_and_label_without_features() {
        let item = parse_line(r#"{"tweet": "hello", "retweets_count": 42}"#, 1, &[]).unwrap();

        assert_eq!(item, Item::new("hello".to_string(), vec![], 2));
    }

    #[test]
    fn parses_features_in_configured_order() {
        let line = r#"{"tweet": "gm", "retweets_count": 0, "is_quote_tweet": true,
            "hashtags_count": 3, "created_at_hour": 14.0}"#;

        let item = parse_line(
            line,
            1,
            &features(&["created_at_hour", "hashtags_count", "is_quote_tweet"]),
        )
        .unwrap();

        assert_eq!(item.features, vec![14, 3, 1]);
        assert_eq!(item.label, 0);
    }

    #[test]
    fn rejects_missing_feature() {
        let err = parse_line(
            r#"{"tweet": "gm", "retweets_count": 0}"#,
            7,
            &features(&["mentions_count"]),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DatasetError::MissingFeature { line: 7, ref feature } if feature == "mentions_count"
        ));
    }

    #[test]
    fn rejects_fractional_feature() {
        let err = parse_line(
            r#"{"tweet": "gm", "retweets_count": 0, "mentions_count": 1.5}"#,
            1,
            &features(&["mentions_count"]),
        )
        .unwrap_err();

        assert!(matches!(err, DatasetError::InvalidFeature { .. }));
    }

    #[test]
    fn rejects_negative_retweet_count() {
        let err = parse_line(r#"{"tweet": "gm", "retweets_count": -1}"#, 3, &[]).unwrap_err();

        assert!(matches!(err, DatasetError::Parse { line: 3, .. }));
    }

    #[test]
    fn reads_lines_and_skips_blanks() {
        let data = "{\"tweet\": \"a\", \"retweets_count\": 1}\n\n{\"tweet\": \"b\", \"retweets_count\": 1000}\n";

        let items = read_items(Cursor::new(data), &[]).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[1].label, 3);
    }

    #[test]
    fn reports_line_number_of_malformed_record() {
        let data = "{\"tweet\": \"a\", \"retweets_count\": 1}\nnot json\n";

        let err = read_items(Cursor::new(data), &[]).unwrap_err();

        assert!(matches!(err, DatasetError::Parse { line: 2, .. }));
    }

    #[test]
    fn reads_xz_compressed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tweets.json.xz");

        let mut encoder = XzEncoder::new(File::create(&path).unwrap(), 6);
        writeln!(encoder, r#"{{"tweet": "compressed", "retweets_count": 12}}"#).unwrap();
        encoder.finish().unwrap();

        let items = read_file(&path, &[]).unwrap();

        assert_eq!(items, vec![Item::new("compressed".to_string(), vec![], 2)]);
    }

    #[test]
    fn caches_by_url_file_name() {
        let url = Url::parse(DEFAULT_URL).unwrap();

        assert_eq!(
            cache_path("data", &url),
            PathBuf::from("data/datasets/tweets/all_tweets.json.xz")
        );
    }
}
