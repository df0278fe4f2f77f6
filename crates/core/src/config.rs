//! Core runtime configuration.
//!
//! This module defines configuration that is resolved once at process startup and then passed
//! into every component that classifies data. Classification patterns are compiled here, once,
//! instead of living in process-wide statics; tests build their own [`CdsConfig`] directly.
//!
//! Nothing in this module reads environment variables. Binaries gather raw values (a config
//! file path, pattern strings, a timeout) and hand them to the constructors below.

use crate::constants::{
    DEFAULT_HOSPITAL_PROBLEM_LIST_TITLE, DEFAULT_TIMEOUT_SECS, DEFAULT_VISIT_TYPE_CODES,
    DEFAULT_VOCABULARY_SYSTEM,
};
use crate::{CdsError, CdsResult};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Raw inputs
// ============================================================================

/// Organisation-specific settings as stored in the JSON configuration file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// SmartData slot the rendered alert text is written to.
    pub alert_text_location: String,
    pub asthma_action_plan: ActionPlanConfig,
    /// OID prefixed to SmartData codes in observation queries.
    #[serde(rename = "observationOID")]
    pub observation_oid: String,
    /// Control-tool SmartData codes. Only the keys are used.
    #[serde(default)]
    pub asthma_control_tool: BTreeMap<String, bool>,
    pub order_set_key: String,
    pub system_user: String,
    #[serde(default)]
    pub hospital_problem_list_title: Option<String>,
    #[serde(default)]
    pub visit_type_codes: Option<Vec<String>>,
    #[serde(default)]
    pub vocabulary_system: Option<String>,
}

/// Action-plan SmartData codes and the green→yellow medication mapping.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlanConfig {
    pub green_zone: String,
    pub yellow_zone: String,
    /// Green-zone medication code → yellow-zone codes that represent the same therapy.
    #[serde(default)]
    pub medication_map: HashMap<String, Vec<String>>,
}

/// Uncompiled classification patterns.
#[derive(Clone, Debug, Default)]
pub struct PatternSources {
    pub antiasthmatic: String,
    pub biologic: String,
    pub controller: String,
    pub ics_formoterol: String,
    pub steroid: String,
    pub asthma_icd: String,
    pub csn_system: String,
    pub encounter_type_system: String,
}

impl PatternSources {
    /// Environment variable names, in field order.
    pub const VARIABLES: [&'static str; 8] = [
        "ANTI_ASTHMATIC_REGEX",
        "BIOLOGIC_REGEX",
        "CONTROLLER_REGEX",
        "ICSF_REGEX",
        "STEROID_REGEX",
        "ASTHMA_ICD_REGEX",
        "CSN_SYSTEM_REGEX",
        "ENC_TYPE_SYSTEM_REGEX",
    ];

    /// Gather pattern sources through a lookup function.
    ///
    /// The lookup is usually `|key| std::env::var(key).ok()`; tests pass a closure over a map.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::Config`] naming the first variable that is missing or blank. An
    /// empty pattern would match every code, so it is never accepted silently.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CdsResult<Self> {
        let read = |key: &str| -> CdsResult<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| CdsError::Config(format!("{key} is not set")))
        };

        Ok(Self {
            antiasthmatic: read(Self::VARIABLES[0])?,
            biologic: read(Self::VARIABLES[1])?,
            controller: read(Self::VARIABLES[2])?,
            ics_formoterol: read(Self::VARIABLES[3])?,
            steroid: read(Self::VARIABLES[4])?,
            asthma_icd: read(Self::VARIABLES[5])?,
            csn_system: read(Self::VARIABLES[6])?,
            encounter_type_system: read(Self::VARIABLES[7])?,
        })
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Compiled classification patterns.
#[derive(Clone, Debug)]
pub struct ClassificationPatterns {
    pub antiasthmatic: Regex,
    pub biologic: Regex,
    pub controller: Regex,
    pub ics_formoterol: Regex,
    pub steroid: Regex,
    pub asthma_icd: Regex,
    pub csn_system: Regex,
    pub encounter_type_system: Regex,
}

impl ClassificationPatterns {
    /// Compile every pattern.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::Pattern`] naming the first pattern that fails to compile.
    pub fn compile(sources: &PatternSources) -> CdsResult<Self> {
        fn compile_one(name: &'static str, source: &str) -> CdsResult<Regex> {
            Regex::new(source).map_err(|source| CdsError::Pattern { name, source })
        }

        Ok(Self {
            antiasthmatic: compile_one("antiasthmatic", &sources.antiasthmatic)?,
            biologic: compile_one("biologic", &sources.biologic)?,
            controller: compile_one("controller", &sources.controller)?,
            ics_formoterol: compile_one("ics_formoterol", &sources.ics_formoterol)?,
            steroid: compile_one("steroid", &sources.steroid)?,
            asthma_icd: compile_one("asthma_icd", &sources.asthma_icd)?,
            csn_system: compile_one("csn_system", &sources.csn_system)?,
            encounter_type_system: compile_one(
                "encounter_type_system",
                &sources.encounter_type_system,
            )?,
        })
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CdsConfig {
    patterns: ClassificationPatterns,
    action_plan: ActionPlanConfig,
    control_tool_codes: BTreeSet<String>,
    observation_oid: String,
    alert_text_location: String,
    order_set_key: String,
    system_user: String,
    hospital_problem_list_title: String,
    visit_type_codes: Vec<String>,
    vocabulary_system: String,
    timeout: Duration,
}

impl CdsConfig {
    /// Create a new `CdsConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::Pattern`] if a pattern does not compile, or [`CdsError::Config`] if
    /// the action plan zones are blank or the timeout is zero.
    pub fn new(file: ConfigFile, patterns: &PatternSources, timeout: Duration) -> CdsResult<Self> {
        if file.asthma_action_plan.green_zone.trim().is_empty()
            || file.asthma_action_plan.yellow_zone.trim().is_empty()
        {
            return Err(CdsError::Config(
                "asthmaActionPlan greenZone and yellowZone must be set".into(),
            ));
        }
        if timeout.is_zero() {
            return Err(CdsError::Config("timeout must be greater than zero".into()));
        }

        Ok(Self {
            patterns: ClassificationPatterns::compile(patterns)?,
            control_tool_codes: file.asthma_control_tool.into_keys().collect(),
            action_plan: file.asthma_action_plan,
            observation_oid: file.observation_oid,
            alert_text_location: file.alert_text_location,
            order_set_key: file.order_set_key,
            system_user: file.system_user,
            hospital_problem_list_title: file
                .hospital_problem_list_title
                .unwrap_or_else(|| DEFAULT_HOSPITAL_PROBLEM_LIST_TITLE.into()),
            visit_type_codes: file.visit_type_codes.unwrap_or_else(|| {
                DEFAULT_VISIT_TYPE_CODES
                    .iter()
                    .map(|code| code.to_string())
                    .collect()
            }),
            vocabulary_system: file
                .vocabulary_system
                .unwrap_or_else(|| DEFAULT_VOCABULARY_SYSTEM.into()),
            timeout,
        })
    }

    pub fn patterns(&self) -> &ClassificationPatterns {
        &self.patterns
    }

    pub fn action_plan(&self) -> &ActionPlanConfig {
        &self.action_plan
    }

    pub fn control_tool_codes(&self) -> &BTreeSet<String> {
        &self.control_tool_codes
    }

    pub fn observation_oid(&self) -> &str {
        &self.observation_oid
    }

    pub fn alert_text_location(&self) -> &str {
        &self.alert_text_location
    }

    pub fn order_set_key(&self) -> &str {
        &self.order_set_key
    }

    pub fn system_user(&self) -> &str {
        &self.system_user
    }

    pub fn hospital_problem_list_title(&self) -> &str {
        &self.hospital_problem_list_title
    }

    pub fn visit_type_codes(&self) -> &[String] {
        &self.visit_type_codes
    }

    pub fn vocabulary_system(&self) -> &str {
        &self.vocabulary_system
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Read and parse the JSON configuration file.
///
/// Uses `serde_path_to_error` so a wrong field reports its path (e.g. `asthmaActionPlan.greenZone`).
///
/// # Errors
///
/// Returns [`CdsError::ConfigRead`] if the file cannot be read and [`CdsError::Config`] if it is
/// not valid configuration JSON.
pub fn read_config_file(path: &Path) -> CdsResult<ConfigFile> {
    let contents = std::fs::read_to_string(path).map_err(CdsError::ConfigRead)?;
    let mut deserializer = serde_json::Deserializer::from_str(&contents);

    serde_path_to_error::deserialize::<_, ConfigFile>(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        CdsError::Config(format!(
            "config schema mismatch at {path}: {}",
            err.into_inner()
        ))
    })
}

/// Parse the per-request timeout from an optional string of whole seconds.
///
/// If `value` is `None` or blank, returns the default of 30 seconds.
///
/// # Errors
///
/// Returns [`CdsError::Config`] if the value is not a positive integer.
pub fn timeout_from_env_value(value: Option<String>) -> CdsResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let secs = match value {
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| CdsError::Config(format!("TIMEOUT must be whole seconds, got '{v}'")))?,
        None => DEFAULT_TIMEOUT_SECS,
    };

    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
pub(crate) fn test_patterns() -> PatternSources {
    PatternSources {
        antiasthmatic: "^44".into(),
        biologic: "^4460".into(),
        controller: "^4440".into(),
        ics_formoterol: "^444099".into(),
        steroid: "^2210".into(),
        asthma_icd: "^J45".into(),
        csn_system: r"\.8\.698084$".into(),
        encounter_type_system: r"\.10110$".into(),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> CdsConfig {
    let mut medication_map = HashMap::new();
    medication_map.insert("G-ICSF".to_string(), vec!["Y-A".to_string(), "Y-B".to_string()]);

    let file = ConfigFile {
        alert_text_location: "SDI-ALERT".into(),
        asthma_action_plan: ActionPlanConfig {
            green_zone: "GREEN".into(),
            yellow_zone: "YELLOW".into(),
            medication_map,
        },
        observation_oid: "urn:oid:1.2.840.114350".into(),
        asthma_control_tool: BTreeMap::from([("ACT-1".to_string(), true)]),
        order_set_key: "OS-1".into(),
        system_user: "SYSUSER".into(),
        ..ConfigFile::default()
    };

    CdsConfig::new(file, &test_patterns(), Duration::from_secs(5))
        .expect("test configuration should be valid")
}
