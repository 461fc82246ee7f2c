use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Run settings, read from the `config:` block of the input and
/// overridden from the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelSettings,
    pub solver: SolverSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Name of the program, used in the LP dump and in error messages.
    pub name: String,
    #[serde(rename = "bigM")]
    pub big_m: BigM,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            big_m: BigM::Auto,
        }
    }
}

fn default_model_name() -> String {
    "school_allocation".to_owned()
}

/// Constant used to link a group's flow to its choice indicator.
///
/// `Auto` takes the largest group demand, which is the smallest value that
/// never cuts off a feasible assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BigMValue", into = "BigMValue")]
pub enum BigM {
    #[default]
    Auto,
    Fixed(f64),
}

/// YAML form of [`BigM`]: the keyword `auto` or a number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum BigMValue {
    Keyword(String),
    Value(f64),
}

impl TryFrom<BigMValue> for BigM {
    type Error = String;

    fn try_from(value: BigMValue) -> Result<Self, Self::Error> {
        match value {
            BigMValue::Keyword(k) if k.eq_ignore_ascii_case("auto") => Ok(BigM::Auto),
            BigMValue::Keyword(k) => Err(format!("bigM must be 'auto' or a number, found '{k}'")),
            BigMValue::Value(m) if m.is_finite() && m > 0.0 => Ok(BigM::Fixed(m)),
            BigMValue::Value(m) => Err(format!("bigM must be positive, found {m}")),
        }
    }
}

impl From<BigM> for BigMValue {
    fn from(big_m: BigM) -> Self {
        match big_m {
            BigM::Auto => BigMValue::Keyword("auto".to_owned()),
            BigM::Fixed(m) => BigMValue::Value(m),
        }
    }
}

impl std::str::FromStr for BigM {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<f64>() {
            Ok(m) => BigM::try_from(BigMValue::Value(m)),
            Err(_) => BigM::try_from(BigMValue::Keyword(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Wall-clock limit for a single solve. Hitting it fails the run.
    #[serde(rename = "timeLimitSeconds")]
    pub time_limit_seconds: Option<TimeLimit>,
    /// Let the solver print its own log.
    pub verbose: bool,
}

/// Solver wall-clock limit in seconds; always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct TimeLimit(f64);

impl TimeLimit {
    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for TimeLimit {
    type Error = String;

    fn try_from(seconds: f64) -> Result<Self, Self::Error> {
        if seconds.is_finite() && seconds > 0.0 {
            Ok(TimeLimit(seconds))
        } else {
            Err(format!("timeLimitSeconds must be a positive number, found {seconds}"))
        }
    }
}

impl From<TimeLimit> for f64 {
    fn from(limit: TimeLimit) -> Self {
        limit.0
    }
}

impl std::str::FromStr for TimeLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let seconds: f64 = s
            .parse()
            .map_err(|_| format!("time limit must be a number of seconds, found '{s}'"))?;
        TimeLimit::try_from(seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub directory: PathBuf,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub encoding: Encoding,
    /// When set, the assembled program is also written in LP format.
    #[serde(rename = "lpFile")]
    pub lp_file: Option<PathBuf>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            file_name: "output.csv".to_owned(),
            encoding: Encoding::default(),
            lp_file: None,
        }
    }
}

impl ExportSettings {
    pub fn csv_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Text encoding of the exported table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "latin-1")]
    Latin1,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(format!("unsupported encoding '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_block_uses_defaults() {
        let config: RunConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.export.csv_path(), PathBuf::from("output/output.csv"));
        assert_eq!(config.model.big_m, BigM::Auto);
    }

    #[test]
    fn partial_block_overrides_fields() {
        let yaml = r#"
model:
  bigM: 10000
solver:
  timeLimitSeconds: 30
export:
  encoding: latin-1
  lpFile: schools.lp
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.model.big_m, BigM::Fixed(10000.0));
        assert_eq!(config.model.name, "school_allocation");
        assert_eq!(
            config.solver.time_limit_seconds.map(TimeLimit::seconds),
            Some(30.0)
        );
        assert_eq!(config.export.encoding, Encoding::Latin1);
        assert_eq!(config.export.lp_file, Some(PathBuf::from("schools.lp")));
        assert_eq!(config.export.directory, PathBuf::from("output"));
    }

    #[test]
    fn big_m_rejects_unknown_keywords_and_non_positive_values() {
        assert_eq!("auto".parse::<BigM>(), Ok(BigM::Auto));
        assert_eq!("500".parse::<BigM>(), Ok(BigM::Fixed(500.0)));
        assert!("huge".parse::<BigM>().is_err());
        assert!(serde_yaml::from_str::<BigM>("-1").is_err());
    }

    #[test]
    fn time_limit_must_be_finite_and_positive() {
        for bad in ["-5", "0", ".nan", ".inf"] {
            let yaml = format!("solver:\n  timeLimitSeconds: {bad}\n");
            assert!(
                serde_yaml::from_str::<RunConfig>(&yaml).is_err(),
                "accepted timeLimitSeconds: {bad}"
            );
        }
        assert_eq!("2.5".parse::<TimeLimit>().map(TimeLimit::seconds), Ok(2.5));
        assert!("-1".parse::<TimeLimit>().is_err());
        assert!("NaN".parse::<TimeLimit>().is_err());
        assert!("soon".parse::<TimeLimit>().is_err());
    }

    #[test]
    fn encoding_parses_common_spellings() {
        assert_eq!("UTF8".parse::<Encoding>(), Ok(Encoding::Utf8));
        assert_eq!("iso-8859-1".parse::<Encoding>(), Ok(Encoding::Latin1));
        assert!("utf-16".parse::<Encoding>().is_err());
    }
}
