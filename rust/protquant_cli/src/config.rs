use protquant::hyperparameters::HyperparameterConfig;
use protquant::models::{
    SampleGroup,
    SampleGroups,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub input: Option<InputConfig>,
    pub analysis: AnalysisConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupConfig {
    pub label: String,
    /// Sample names, as they appear in the input table.
    pub samples: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalysisConfig {
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub hyperparameters: HyperparameterConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

/// Sample names in inference order plus the groups over their indices.
#[derive(Debug, Clone)]
pub struct SampleLayout {
    pub names: Vec<String>,
    pub index: HashMap<String, usize>,
    pub groups: SampleGroups,
}

impl AnalysisConfig {
    /// Samples are numbered in the order the groups list them.
    pub fn sample_layout(&self) -> Result<SampleLayout, CliError> {
        let mut names = Vec::new();
        let mut index = HashMap::new();
        let mut groups = Vec::with_capacity(self.groups.len());
        for group in self.groups.iter() {
            let mut samples = Vec::with_capacity(group.samples.len());
            for name in group.samples.iter() {
                if index.contains_key(name) {
                    return Err(CliError::Config {
                        source: format!("sample '{}' is listed more than once", name),
                    });
                }
                index.insert(name.clone(), names.len());
                samples.push(names.len());
                names.push(name.clone());
            }
            groups.push(SampleGroup {
                label: group.label.clone(),
                samples,
            });
        }
        let groups = SampleGroups::new(groups)?;
        Ok(SampleLayout {
            names,
            index,
            groups,
        })
    }
}

impl Config {
    pub fn from_json_str(content: &str) -> Result<Self, CliError> {
        serde_json::from_str(content).map_err(|e| CliError::ParseError { msg: e.to_string() })
    }

    /// Command line flags take precedence over the file.
    pub fn with_cli_args(mut self, args: &Cli) -> Self {
        if let Some(input_file) = &args.input_file {
            self.input = Some(InputConfig {
                path: input_file.clone(),
            });
        }
        if let Some(output_dir) = &args.output_dir {
            self.output = Some(OutputConfig {
                directory: output_dir.clone(),
            });
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "input": { "path": "quant.tsv" },
        "analysis": {
            "groups": [
                { "label": "ctrl", "samples": ["c1", "c2"] },
                { "label": "treated", "samples": ["t1", "t2", "t3"] }
            ],
            "hyperparameters": { "mu_detect": 3.5, "fold_change_eval": 0.8 }
        },
        "output": { "directory": "out" }
    }"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_json_str(CONFIG).unwrap();
        assert_eq!(config.analysis.hyperparameters.mu_detect, 3.5);
        assert_eq!(config.analysis.hyperparameters.fold_change_eval, 0.8);
        // Untouched fields keep their default
        assert_eq!(
            config.analysis.hyperparameters.sigma_detect,
            HyperparameterConfig::default().sigma_detect
        );
        let layout = config.analysis.sample_layout().unwrap();
        assert_eq!(layout.names, vec!["c1", "c2", "t1", "t2", "t3"]);
        assert_eq!(layout.index["t1"], 2);
        assert_eq!(layout.groups.get(1).unwrap().samples, vec![2, 3, 4]);
    }

    #[test]
    fn test_cli_args_override() {
        let config = Config::from_json_str(CONFIG).unwrap();
        let args = Cli {
            config: PathBuf::from("config.json"),
            input_file: Some(PathBuf::from("other.tsv")),
            output_dir: None,
        };
        let config = config.with_cli_args(&args);
        assert_eq!(config.input.unwrap().path, PathBuf::from("other.tsv"));
        assert_eq!(config.output.unwrap().directory, PathBuf::from("out"));
    }

    #[test]
    fn test_rejects_repeated_samples() {
        let config = Config::from_json_str(
            r#"{"analysis": {"groups": [
                {"label": "a", "samples": ["s1"]},
                {"label": "b", "samples": ["s1"]}
            ]}, "input": null, "output": null}"#,
        )
        .unwrap();
        assert!(config.analysis.sample_layout().is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            Config::from_json_str("{"),
            Err(CliError::ParseError { .. })
        ));
    }
}
