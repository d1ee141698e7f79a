//! On-disk data model for cellar.
//!
//! Tap repositories hold one JSON definition per formula (`Formula/<name>.json`)
//! or cask (`Casks/<token>.json`). Every installed keg carries an
//! [`InstallReceipt`] and every installed cask keeps a copy of the definition
//! it was installed from.

use serde::{Deserialize, Serialize};

/// File name of the receipt written into every keg.
pub const INSTALL_RECEIPT: &str = "INSTALL_RECEIPT.json";

/// Directory under `Caskroom/<token>/` holding the installed definition.
pub const CASK_METADATA_DIR: &str = ".metadata";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct OptionDefinition {
    /// `--with-foo`, or `--foo=` for an option taking a value.
    pub flag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FormulaDefinition {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub homepage: String,
    /// Source URL of the development version, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub revision: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionDefinition>,
}

impl FormulaDefinition {
    /// Version directory name, with `_<revision>` when the revision is non-zero.
    pub fn pkg_version(&self) -> String {
        if self.revision == 0 {
            self.version.clone()
        } else {
            format!("{}_{}", self.version, self.revision)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CaskDefinition {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
}

/// What was installed into a keg, and how.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct InstallReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap: Option<String>,
    /// `stable` or `head`.
    #[serde(default = "default_spec")]
    pub spec: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub used_options: Vec<String>,
    /// Seconds since the epoch; orders HEAD builds that share a version.
    #[serde(default)]
    pub source_modified_time: u64,
    #[serde(default)]
    pub installed_on_request: bool,
    #[serde(default)]
    pub time: u64,
}

impl InstallReceipt {
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

fn default_spec() -> String {
    "stable".to_string()
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_definition_fills_defaults() {
        let def: FormulaDefinition =
            serde_json::from_str(r#"{"name":"wget","version":"1.24.5"}"#).unwrap();
        assert_eq!(def.name, "wget");
        assert!(def.options.is_empty());
        assert_eq!(def.head, None);
        assert_eq!(def.pkg_version(), "1.24.5");
    }

    #[test]
    fn pkg_version_appends_revision() {
        let def = FormulaDefinition {
            name: "curl".into(),
            version: "8.6.0".into(),
            revision: 2,
            ..Default::default()
        };
        assert_eq!(def.pkg_version(), "8.6.0_2");
    }

    #[test]
    fn receipt_omits_empty_fields() {
        let receipt = InstallReceipt {
            spec: "stable".into(),
            ..Default::default()
        };
        let json = String::from_utf8(receipt.to_json_bytes().unwrap()).unwrap();
        assert!(!json.contains("used_options"));
        assert!(!json.contains("tap"));

        let parsed: InstallReceipt = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.spec, "stable");
    }

    #[test]
    fn receipt_serializes_and_reads_back() {
        let receipt = InstallReceipt {
            tap: Some("homebrew/core".into()),
            spec: "head".into(),
            used_options: vec!["--with-bar".into()],
            source_modified_time: 1_700_000_000,
            installed_on_request: true,
            time: 1_700_000_001,
        };
        let bytes = receipt.to_json_bytes().unwrap();
        let parsed: InstallReceipt = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, receipt);
    }

    #[test]
    fn formula_options_parse_with_descriptions() {
        let def: FormulaDefinition = serde_json::from_str(
            r#"{"name":"foo","version":"1.0","options":[{"flag":"--with-bar","description":"Build with bar."}]}"#,
        )
        .unwrap();
        assert_eq!(
            def.options,
            [OptionDefinition {
                flag: "--with-bar".into(),
                description: "Build with bar.".into(),
            }]
        );
    }
}
