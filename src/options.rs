//! Optionen eines Encode-/Decode-Aufrufs.
//!
//! Das Stream-Profil selbst ist fest (bit-packed, keine Kompression); hier
//! liegen nur die drei Schalter der Binding-Grenze.
//!
//! # Beispiel
//!
//! ```
//! use v2gexi::options::{BuiltInGrammarPolicy, CodecOptions};
//!
//! let mut opts = CodecOptions::default().with_strict_field_mode(false);
//! opts.set("builtInGrammarPolicy", "extendDynamic").unwrap();
//! opts.set("maxStringTableEntries", "64").unwrap();
//!
//! assert!(!opts.strict_field_mode());
//! assert_eq!(opts.built_in_grammar_policy(), BuiltInGrammarPolicy::ExtendDynamic);
//! assert_eq!(opts.max_string_table_entries(), Some(64));
//! assert!(opts.set("compression", "true").is_err());
//! ```

use core::fmt;
use core::str::FromStr;

use crate::{Error, Result, boolean};

/// Umgang mit Events, fuer die das Schema keine Production hat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuiltInGrammarPolicy {
    /// Escape-Code wird weder geschrieben noch akzeptiert (Default).
    #[default]
    RejectUnknown,
    /// Escape-Code erlaubt; das Event wird fuer den Rest des Aufrufs gelernt.
    ExtendDynamic,
}

impl FromStr for BuiltInGrammarPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rejectUnknown" => Ok(Self::RejectUnknown),
            "extendDynamic" => Ok(Self::ExtendDynamic),
            other => Err(Error::InvalidArgument(format!(
                "builtInGrammarPolicy must be rejectUnknown or extendDynamic, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BuiltInGrammarPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RejectUnknown => "rejectUnknown",
            Self::ExtendDynamic => "extendDynamic",
        })
    }
}

/// Die Optionen, die `setOption` kennt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    strict_field_mode: bool,
    max_string_table_entries: Option<usize>,
    built_in_grammar_policy: BuiltInGrammarPolicy,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            strict_field_mode: true,
            max_string_table_entries: None,
            built_in_grammar_policy: BuiltInGrammarPolicy::RejectUnknown,
        }
    }
}

impl CodecOptions {
    /// Unbekannte Felder im Field-Tree: Fehler (`true`) oder verwerfen.
    pub fn strict_field_mode(&self) -> bool {
        self.strict_field_mode
    }

    /// Obergrenze fuer Value-Eintraege der String Table; `None` = unbegrenzt.
    pub fn max_string_table_entries(&self) -> Option<usize> {
        self.max_string_table_entries
    }

    pub fn built_in_grammar_policy(&self) -> BuiltInGrammarPolicy {
        self.built_in_grammar_policy
    }

    pub fn with_strict_field_mode(mut self, strict: bool) -> Self {
        self.strict_field_mode = strict;
        self
    }

    /// `0` heisst unbegrenzt.
    pub fn with_max_string_table_entries(mut self, max: usize) -> Self {
        self.max_string_table_entries = (max > 0).then_some(max);
        self
    }

    pub fn with_built_in_grammar_policy(mut self, policy: BuiltInGrammarPolicy) -> Self {
        self.built_in_grammar_policy = policy;
        self
    }

    /// `setOption(name, value)` der Binding-Grenze.
    ///
    /// Unbekannte Namen liefern [`Error::UnknownOption`], ungueltige Werte
    /// [`Error::InvalidArgument`]; in beiden Faellen bleibt `self` unveraendert.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match name {
            "strictFieldMode" => {
                self.strict_field_mode = boolean::parse_lexical(value).ok_or_else(|| {
                    Error::InvalidArgument(format!("strictFieldMode expects a boolean, got '{value}'"))
                })?;
            }
            "maxStringTableEntries" => {
                let max = value.parse::<usize>().map_err(|_| {
                    Error::InvalidArgument(format!(
                        "maxStringTableEntries expects an unsigned integer, got '{value}'"
                    ))
                })?;
                self.max_string_table_entries = (max > 0).then_some(max);
            }
            "builtInGrammarPolicy" => self.built_in_grammar_policy = value.parse()?,
            other => return Err(Error::UnknownOption(other.to_string())),
        }
        log::debug!("option {name} = {value}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = CodecOptions::default();
        assert!(opts.strict_field_mode());
        assert_eq!(opts.max_string_table_entries(), None);
        assert_eq!(opts.built_in_grammar_policy(), BuiltInGrammarPolicy::RejectUnknown);
    }

    #[test]
    fn set_boolean_varianten() {
        let mut opts = CodecOptions::default();
        opts.set("strictFieldMode", "0").unwrap();
        assert!(!opts.strict_field_mode());
        opts.set("strictFieldMode", "true").unwrap();
        assert!(opts.strict_field_mode());
    }

    #[test]
    fn null_heisst_unbegrenzt() {
        let mut opts = CodecOptions::default().with_max_string_table_entries(5);
        opts.set("maxStringTableEntries", "0").unwrap();
        assert_eq!(opts.max_string_table_entries(), None);
    }

    #[test]
    fn unbekannte_option() {
        let mut opts = CodecOptions::default();
        let err = opts.set("alignment", "byte").unwrap_err();
        assert_eq!(err, Error::UnknownOption("alignment".into()));
    }

    #[test]
    fn ungueltiger_wert_aendert_nichts() {
        let mut opts = CodecOptions::default();
        assert!(matches!(opts.set("maxStringTableEntries", "-1"), Err(Error::InvalidArgument(_))));
        assert!(matches!(opts.set("builtInGrammarPolicy", "lenient"), Err(Error::InvalidArgument(_))));
        assert!(matches!(opts.set("strictFieldMode", "yes"), Err(Error::InvalidArgument(_))));
        assert_eq!(opts, CodecOptions::default());
    }

    #[test]
    fn policy_display() {
        assert_eq!(BuiltInGrammarPolicy::ExtendDynamic.to_string(), "extendDynamic");
        assert_eq!("rejectUnknown".parse::<BuiltInGrammarPolicy>().unwrap(), BuiltInGrammarPolicy::RejectUnknown);
    }
}
