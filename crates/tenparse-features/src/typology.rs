//! Per-language typological table
//!
//! File format (whitespace separated):
//!
//! ```text
//! <languages> 5 <classes>
//! <#SV values> <#VO values> <#Prep values> <#Gen values> <#Adj values>
//! <code> <sv> <vo> <prep> <gen> <adj> <class> [<family>]
//! ...
//! ```
//!
//! Feature values and classes are zero-based. The optional family column is
//! ignored: every language is its own family.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};

/// The five word-order features of the table, in column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypoFeature {
    /// Subject–verb order
    Sv,
    /// Verb–object order
    Vo,
    /// Adposition placement
    Prep,
    /// Genitive–noun order
    Gen,
    /// Adjective–noun order
    Adj,
}

impl TypoFeature {
    pub const ALL: [TypoFeature; 5] = [
        TypoFeature::Sv,
        TypoFeature::Vo,
        TypoFeature::Prep,
        TypoFeature::Gen,
        TypoFeature::Adj,
    ];

    #[inline]
    pub fn column(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTypology {
    pub code: String,
    pub features: [usize; 5],
    pub class: usize,
    pub family: usize,
}

impl LanguageTypology {
    #[inline]
    pub fn value(&self, feature: TypoFeature) -> usize {
        self.features[feature.column()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typology {
    value_counts: [usize; 5],
    class_count: usize,
    languages: Vec<LanguageTypology>,
}

fn parse_field(line: usize, field: &str, what: &str) -> FeatureResult<usize> {
    field.parse().map_err(|_| FeatureError::Typology {
        line,
        message: format!("{} must be a non-negative integer, got {:?}", what, field),
    })
}

impl Typology {
    pub fn parse(text: &str) -> FeatureResult<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (line, header) = lines.next().ok_or(FeatureError::Typology {
            line: 1,
            message: "empty table".to_string(),
        })?;
        let header: Vec<&str> = header.split_whitespace().collect();
        if header.len() < 3 {
            return Err(FeatureError::Typology {
                line,
                message: "header needs language, feature and class counts".to_string(),
            });
        }
        let language_count = parse_field(line, header[0], "language count")?;
        let feature_count = parse_field(line, header[1], "feature count")?;
        let class_count = parse_field(line, header[2], "class count")?;
        if feature_count != TypoFeature::ALL.len() {
            return Err(FeatureError::Typology {
                line,
                message: format!("expected 5 features, got {}", feature_count),
            });
        }

        let (line, counts) = lines.next().ok_or(FeatureError::Typology {
            line: line + 1,
            message: "missing value counts".to_string(),
        })?;
        let counts: Vec<&str> = counts.split_whitespace().collect();
        if counts.len() != feature_count {
            return Err(FeatureError::Typology {
                line,
                message: format!("expected {} value counts, got {}", feature_count, counts.len()),
            });
        }
        let mut value_counts = [0; 5];
        for (slot, field) in value_counts.iter_mut().zip(&counts) {
            *slot = parse_field(line, field, "value count")?;
        }

        let mut languages = Vec::with_capacity(language_count);
        for (line, row) in lines {
            let fields: Vec<&str> = row.split_whitespace().collect();
            if fields.len() != feature_count + 2 && fields.len() != feature_count + 3 {
                return Err(FeatureError::Typology {
                    line,
                    message: format!("expected {} or {} fields", feature_count + 2, feature_count + 3),
                });
            }
            let mut features = [0; 5];
            for (k, feature) in TypoFeature::ALL.iter().enumerate() {
                let v = parse_field(line, fields[1 + k], "feature value")?;
                if v >= value_counts[k] {
                    return Err(FeatureError::Typology {
                        line,
                        message: format!(
                            "{:?} value {} out of range 0..{}",
                            feature, v, value_counts[k]
                        ),
                    });
                }
                features[k] = v;
            }
            let class = parse_field(line, fields[1 + feature_count], "class")?;
            if class >= class_count {
                return Err(FeatureError::Typology {
                    line,
                    message: format!("class {} out of range 0..{}", class, class_count),
                });
            }
            languages.push(LanguageTypology {
                code: fields[0].to_string(),
                features,
                class,
                family: languages.len(),
            });
        }

        if languages.len() != language_count {
            return Err(FeatureError::Typology {
                line: 1,
                message: format!(
                    "header declares {} languages, table has {}",
                    language_count,
                    languages.len()
                ),
            });
        }
        Ok(Self {
            value_counts,
            class_count,
            languages,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> FeatureResult<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Index of the language with `code`
    pub fn language(&self, code: &str) -> FeatureResult<usize> {
        self.languages
            .iter()
            .position(|l| l.code == code)
            .ok_or_else(|| FeatureError::UnknownLanguage(code.to_string()))
    }

    pub fn get(&self, language: usize) -> Option<&LanguageTypology> {
        self.languages.get(language)
    }

    pub fn languages(&self) -> &[LanguageTypology] {
        &self.languages
    }

    pub fn value_count(&self, feature: TypoFeature) -> usize {
        self.value_counts[feature.column()]
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn family_count(&self) -> usize {
        self.languages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "3 5 2\n3 3 2 2 2\nen 0 0 0 1 0 0\nja 0 1 1 0 0 1 7\nde 0 2 0 1 0 0\n";

    #[test]
    fn test_parse_table() {
        let typo = Typology::parse(TABLE).unwrap();
        assert_eq!(typo.class_count(), 2);
        assert_eq!(typo.family_count(), 3);
        assert_eq!(typo.value_count(TypoFeature::Vo), 3);

        let ja = typo.language("ja").unwrap();
        assert_eq!(ja, 1);
        let ja = typo.get(ja).unwrap();
        assert_eq!(ja.value(TypoFeature::Vo), 1);
        assert_eq!(ja.value(TypoFeature::Prep), 1);
        assert_eq!(ja.class, 1);
        assert_eq!(ja.family, 1);
    }

    #[test]
    fn test_rejects_out_of_range_value() {
        let err = Typology::parse("1 5 1\n2 2 2 2 2\nen 0 0 3 0 0 0\n").unwrap_err();
        assert!(matches!(err, FeatureError::Typology { line: 3, .. }));
    }

    #[test]
    fn test_rejects_language_count_mismatch() {
        assert!(Typology::parse("2 5 1\n2 2 2 2 2\nen 0 0 0 0 0 0\n").is_err());
        assert!(matches!(
            Typology::parse(TABLE).unwrap().language("fr"),
            Err(FeatureError::UnknownLanguage(_))
        ));
    }
}
