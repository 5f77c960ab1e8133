//! The three typed configuration layers and their key tables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::overrides::{
    bool_token, parse_bool, parse_f64, parse_list, parse_opt_list, parse_opt_path,
    parse_opt_string, parse_string, parse_u32,
};
use crate::{Error, Result};

/// A configuration layer owning a fixed set of keys.
pub trait ConfigLayer {
    /// Human-readable layer name used in diagnostics.
    const NAME: &'static str;

    /// Keys owned by this layer. Layers never share a key.
    const KEYS: &'static [&'static str];

    fn owns(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    /// Apply an override for an owned key.
    fn apply(&mut self, key: &str, tokens: &[String]) -> Result<()>;

    /// Current values as `(key, tokens)` pairs; unset optionals are skipped.
    fn tokens(&self) -> Vec<(&'static str, Vec<String>)>;
}

fn unowned(layer: &str, key: &str) -> Error {
    Error::Config(format!("{} is not a {} key", key, layer))
}

fn path_token(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Engine behaviour flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EvalConfig {
    pub use_parallel: bool,
    pub num_parallel_cores: u32,
    pub break_on_error: bool,
    pub return_on_error: bool,
    pub log_on_error: Option<String>,
    pub print_results: bool,
    pub print_only_combined: bool,
    pub print_config: bool,
    pub time_progress: bool,
    pub display_less_progress: bool,
    pub output_summary: bool,
    pub output_empty_classes: bool,
    pub output_detailed: bool,
    pub plot_curves: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            use_parallel: false,
            num_parallel_cores: 8,
            break_on_error: true,
            return_on_error: false,
            log_on_error: None,
            print_results: true,
            print_only_combined: false,
            print_config: true,
            time_progress: true,
            display_less_progress: false,
            output_summary: true,
            output_empty_classes: true,
            output_detailed: true,
            plot_curves: true,
        }
    }
}

impl ConfigLayer for EvalConfig {
    const NAME: &'static str = "eval";
    const KEYS: &'static [&'static str] = &[
        "USE_PARALLEL",
        "NUM_PARALLEL_CORES",
        "BREAK_ON_ERROR",
        "RETURN_ON_ERROR",
        "LOG_ON_ERROR",
        "PRINT_RESULTS",
        "PRINT_ONLY_COMBINED",
        "PRINT_CONFIG",
        "TIME_PROGRESS",
        "DISPLAY_LESS_PROGRESS",
        "OUTPUT_SUMMARY",
        "OUTPUT_EMPTY_CLASSES",
        "OUTPUT_DETAILED",
        "PLOT_CURVES",
    ];

    fn apply(&mut self, key: &str, tokens: &[String]) -> Result<()> {
        match key {
            "USE_PARALLEL" => self.use_parallel = parse_bool(key, tokens)?,
            "NUM_PARALLEL_CORES" => self.num_parallel_cores = parse_u32(key, tokens)?,
            "BREAK_ON_ERROR" => self.break_on_error = parse_bool(key, tokens)?,
            "RETURN_ON_ERROR" => self.return_on_error = parse_bool(key, tokens)?,
            "LOG_ON_ERROR" => self.log_on_error = parse_opt_string(key, tokens)?,
            "PRINT_RESULTS" => self.print_results = parse_bool(key, tokens)?,
            "PRINT_ONLY_COMBINED" => self.print_only_combined = parse_bool(key, tokens)?,
            "PRINT_CONFIG" => self.print_config = parse_bool(key, tokens)?,
            "TIME_PROGRESS" => self.time_progress = parse_bool(key, tokens)?,
            "DISPLAY_LESS_PROGRESS" => self.display_less_progress = parse_bool(key, tokens)?,
            "OUTPUT_SUMMARY" => self.output_summary = parse_bool(key, tokens)?,
            "OUTPUT_EMPTY_CLASSES" => self.output_empty_classes = parse_bool(key, tokens)?,
            "OUTPUT_DETAILED" => self.output_detailed = parse_bool(key, tokens)?,
            "PLOT_CURVES" => self.plot_curves = parse_bool(key, tokens)?,
            _ => return Err(unowned(Self::NAME, key)),
        }
        Ok(())
    }

    fn tokens(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut out = vec![
            ("USE_PARALLEL", vec![bool_token(self.use_parallel)]),
            ("NUM_PARALLEL_CORES", vec![self.num_parallel_cores.to_string()]),
            ("BREAK_ON_ERROR", vec![bool_token(self.break_on_error)]),
            ("RETURN_ON_ERROR", vec![bool_token(self.return_on_error)]),
        ];
        if let Some(log) = &self.log_on_error {
            out.push(("LOG_ON_ERROR", vec![log.clone()]));
        }
        out.extend([
            ("PRINT_RESULTS", vec![bool_token(self.print_results)]),
            ("PRINT_ONLY_COMBINED", vec![bool_token(self.print_only_combined)]),
            ("PRINT_CONFIG", vec![bool_token(self.print_config)]),
            ("TIME_PROGRESS", vec![bool_token(self.time_progress)]),
            ("DISPLAY_LESS_PROGRESS", vec![bool_token(self.display_less_progress)]),
            ("OUTPUT_SUMMARY", vec![bool_token(self.output_summary)]),
            ("OUTPUT_EMPTY_CLASSES", vec![bool_token(self.output_empty_classes)]),
            ("OUTPUT_DETAILED", vec![bool_token(self.output_detailed)]),
            ("PLOT_CURVES", vec![bool_token(self.plot_curves)]),
        ]);
        out
    }
}

/// Dataset location and selection.
///
/// Sequences live at `GT_FOLDER/<BENCHMARK>-<SPLIT_TO_EVAL>/<seq>` and trackers
/// at `TRACKERS_FOLDER/<BENCHMARK>-<SPLIT_TO_EVAL>/<tracker>`, unless
/// `SKIP_SPLIT_FOL` drops the split folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DatasetConfig {
    pub gt_folder: PathBuf,
    pub trackers_folder: PathBuf,
    pub output_folder: Option<PathBuf>,
    pub trackers_to_eval: Option<Vec<String>>,
    pub classes_to_eval: Vec<String>,
    pub benchmark: String,
    pub split_to_eval: String,
    pub input_as_zip: bool,
    pub do_preproc: bool,
    pub tracker_sub_folder: String,
    pub output_sub_folder: String,
    pub tracker_display_names: Option<Vec<String>>,
    pub seqmap_folder: Option<PathBuf>,
    pub seqmap_file: Option<PathBuf>,
    pub seq_info: Option<Vec<String>>,
    pub gt_loc_format: String,
    pub skip_split_fol: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            gt_folder: PathBuf::from("data/gt/mot_challenge/"),
            trackers_folder: PathBuf::from("data/trackers/mot_challenge/"),
            output_folder: None,
            trackers_to_eval: None,
            classes_to_eval: vec!["pedestrian".to_string()],
            benchmark: "MOT17".to_string(),
            split_to_eval: "train".to_string(),
            input_as_zip: false,
            do_preproc: true,
            tracker_sub_folder: "data".to_string(),
            output_sub_folder: String::new(),
            tracker_display_names: None,
            seqmap_folder: None,
            seqmap_file: None,
            seq_info: None,
            gt_loc_format: "{gt_folder}/{seq}/gt/gt.txt".to_string(),
            skip_split_fol: false,
        }
    }
}

impl DatasetConfig {
    /// `<BENCHMARK>-<SPLIT_TO_EVAL>`, or `None` when split folders are skipped.
    pub fn split_folder(&self) -> Option<String> {
        if self.skip_split_fol {
            None
        } else {
            Some(format!("{}-{}", self.benchmark, self.split_to_eval))
        }
    }

    /// Directory holding all sequences of the selected benchmark split.
    pub fn gt_split_dir(&self) -> PathBuf {
        match self.split_folder() {
            Some(split) => self.gt_folder.join(split),
            None => self.gt_folder.clone(),
        }
    }

    /// Directory holding all trackers of the selected benchmark split.
    pub fn trackers_split_dir(&self) -> PathBuf {
        match self.split_folder() {
            Some(split) => self.trackers_folder.join(split),
            None => self.trackers_folder.clone(),
        }
    }

    pub fn sequence_dir(&self, sequence: &str) -> PathBuf {
        self.gt_split_dir().join(sequence)
    }

    pub fn tracker_dir(&self, tracker: &str) -> PathBuf {
        self.trackers_split_dir().join(tracker)
    }

    /// Ground-truth record file of `sequence`, rendered from `GT_LOC_FORMAT`.
    pub fn gt_file(&self, sequence: &str) -> PathBuf {
        PathBuf::from(
            self.gt_loc_format
                .replace("{gt_folder}", &path_token(&self.gt_split_dir()))
                .replace("{seq}", sequence),
        )
    }

    /// Record file of `tracker` for `sequence`.
    pub fn tracker_file(&self, tracker: &str, sequence: &str) -> PathBuf {
        self.tracker_dir(tracker)
            .join(&self.tracker_sub_folder)
            .join(format!("{}.txt", sequence))
    }

    /// File name of the summary the engine writes for the first evaluated class.
    pub fn summary_file_name(&self) -> String {
        let class = self
            .classes_to_eval
            .first()
            .map(String::as_str)
            .unwrap_or("pedestrian");
        format!("{}_summary.txt", class)
    }

    /// Where the engine writes its outputs for `tracker`.
    pub fn output_dir(&self, tracker: &str) -> PathBuf {
        let base = match (&self.output_folder, self.split_folder()) {
            (Some(out), Some(split)) => out.join(split),
            (Some(out), None) => out.clone(),
            (None, _) => self.trackers_split_dir(),
        };
        let dir = base.join(tracker);
        if self.output_sub_folder.is_empty() {
            dir
        } else {
            dir.join(&self.output_sub_folder)
        }
    }
}

impl ConfigLayer for DatasetConfig {
    const NAME: &'static str = "dataset";
    const KEYS: &'static [&'static str] = &[
        "GT_FOLDER",
        "TRACKERS_FOLDER",
        "OUTPUT_FOLDER",
        "TRACKERS_TO_EVAL",
        "CLASSES_TO_EVAL",
        "BENCHMARK",
        "SPLIT_TO_EVAL",
        "INPUT_AS_ZIP",
        "DO_PREPROC",
        "TRACKER_SUB_FOLDER",
        "OUTPUT_SUB_FOLDER",
        "TRACKER_DISPLAY_NAMES",
        "SEQMAP_FOLDER",
        "SEQMAP_FILE",
        "SEQ_INFO",
        "GT_LOC_FORMAT",
        "SKIP_SPLIT_FOL",
    ];

    fn apply(&mut self, key: &str, tokens: &[String]) -> Result<()> {
        match key {
            "GT_FOLDER" => self.gt_folder = parse_string(key, tokens)?.into(),
            "TRACKERS_FOLDER" => self.trackers_folder = parse_string(key, tokens)?.into(),
            "OUTPUT_FOLDER" => self.output_folder = parse_opt_path(key, tokens)?,
            "TRACKERS_TO_EVAL" => self.trackers_to_eval = parse_opt_list(tokens),
            "CLASSES_TO_EVAL" => self.classes_to_eval = parse_list(tokens),
            "BENCHMARK" => self.benchmark = parse_string(key, tokens)?,
            "SPLIT_TO_EVAL" => self.split_to_eval = parse_string(key, tokens)?,
            "INPUT_AS_ZIP" => self.input_as_zip = parse_bool(key, tokens)?,
            "DO_PREPROC" => self.do_preproc = parse_bool(key, tokens)?,
            "TRACKER_SUB_FOLDER" => self.tracker_sub_folder = parse_string(key, tokens)?,
            // An empty sub folder is a legitimate value, so allow zero tokens.
            "OUTPUT_SUB_FOLDER" => {
                self.output_sub_folder = tokens.first().cloned().unwrap_or_default()
            }
            "TRACKER_DISPLAY_NAMES" => self.tracker_display_names = parse_opt_list(tokens),
            "SEQMAP_FOLDER" => self.seqmap_folder = parse_opt_path(key, tokens)?,
            "SEQMAP_FILE" => self.seqmap_file = parse_opt_path(key, tokens)?,
            "SEQ_INFO" => self.seq_info = parse_opt_list(tokens),
            "GT_LOC_FORMAT" => self.gt_loc_format = parse_string(key, tokens)?,
            "SKIP_SPLIT_FOL" => self.skip_split_fol = parse_bool(key, tokens)?,
            _ => return Err(unowned(Self::NAME, key)),
        }
        Ok(())
    }

    fn tokens(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut out = vec![
            ("GT_FOLDER", vec![path_token(&self.gt_folder)]),
            ("TRACKERS_FOLDER", vec![path_token(&self.trackers_folder)]),
        ];
        if let Some(folder) = &self.output_folder {
            out.push(("OUTPUT_FOLDER", vec![path_token(folder)]));
        }
        if let Some(trackers) = &self.trackers_to_eval {
            out.push(("TRACKERS_TO_EVAL", trackers.clone()));
        }
        out.extend([
            ("CLASSES_TO_EVAL", self.classes_to_eval.clone()),
            ("BENCHMARK", vec![self.benchmark.clone()]),
            ("SPLIT_TO_EVAL", vec![self.split_to_eval.clone()]),
            ("INPUT_AS_ZIP", vec![bool_token(self.input_as_zip)]),
            ("DO_PREPROC", vec![bool_token(self.do_preproc)]),
            ("TRACKER_SUB_FOLDER", vec![self.tracker_sub_folder.clone()]),
        ]);
        if !self.output_sub_folder.is_empty() {
            out.push(("OUTPUT_SUB_FOLDER", vec![self.output_sub_folder.clone()]));
        }
        if let Some(names) = &self.tracker_display_names {
            out.push(("TRACKER_DISPLAY_NAMES", names.clone()));
        }
        if let Some(folder) = &self.seqmap_folder {
            out.push(("SEQMAP_FOLDER", vec![path_token(folder)]));
        }
        if let Some(file) = &self.seqmap_file {
            out.push(("SEQMAP_FILE", vec![path_token(file)]));
        }
        if let Some(seqs) = &self.seq_info {
            out.push(("SEQ_INFO", seqs.clone()));
        }
        out.push(("GT_LOC_FORMAT", vec![self.gt_loc_format.clone()]));
        out.push(("SKIP_SPLIT_FOL", vec![bool_token(self.skip_split_fol)]));
        out
    }
}

/// Metric selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MetricsConfig {
    pub metrics: Vec<String>,
    pub threshold: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            metrics: vec!["HOTA".to_string(), "CLEAR".to_string(), "Identity".to_string()],
            threshold: 0.5,
        }
    }
}

impl ConfigLayer for MetricsConfig {
    const NAME: &'static str = "metrics";
    const KEYS: &'static [&'static str] = &["METRICS", "THRESHOLD"];

    fn apply(&mut self, key: &str, tokens: &[String]) -> Result<()> {
        match key {
            "METRICS" => self.metrics = parse_list(tokens),
            "THRESHOLD" => self.threshold = parse_f64(key, tokens)?,
            _ => return Err(unowned(Self::NAME, key)),
        }
        Ok(())
    }

    fn tokens(&self) -> Vec<(&'static str, Vec<String>)> {
        vec![
            ("METRICS", self.metrics.clone()),
            ("THRESHOLD", vec![self.threshold.to_string()]),
        ]
    }
}
