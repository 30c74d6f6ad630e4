use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::categories::Category;
use crate::error::{Error, Result};

/// Fitted token → integer code bijection for one category.
///
/// Classes are kept sorted and de-duplicated, so a token's code is its
/// position in byte-wise sorted order, the same numbering the training
/// side's label encoder produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classes: Vec<String> = tokens.into_iter().map(Into::into).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn contains(&self, token: &str) -> bool {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(token))
            .is_ok()
    }

    pub fn transform(&self, category: Category, token: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(token))
            .map_err(|_| Error::UnknownCategoryValue {
                category,
                value: token.to_string(),
            })
    }

    // Artifacts written by hand may not be sorted; codes must follow sorted
    // order regardless.
    fn normalized(self) -> Self {
        Self::fit(self.classes)
    }
}

/// One fitted encoder per category.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSet {
    encoders: BTreeMap<Category, LabelEncoder>,
}

impl EncoderSet {
    /// Encoders fit on the lookup-table vocabularies.
    pub fn from_lookup_tables() -> Self {
        let encoders = Category::ALL
            .into_iter()
            .map(|category| (category, LabelEncoder::fit(category.tokens())))
            .collect();
        Self { encoders }
    }

    /// Load `label_encoders.json`; every category must be present and non-empty.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::unavailable(path, e))?;
        Self::from_json(&raw).map_err(|reason| Error::unavailable(path, reason))
    }

    fn from_json(raw: &str) -> std::result::Result<Self, String> {
        let parsed: BTreeMap<Category, LabelEncoder> =
            serde_json::from_str(raw).map_err(|e| e.to_string())?;
        for category in Category::ALL {
            match parsed.get(&category) {
                None => return Err(format!("no encoder for {}", category.artifact_key())),
                Some(encoder) if encoder.classes.is_empty() => {
                    return Err(format!("encoder for {} has no classes", category.artifact_key()))
                }
                Some(_) => {}
            }
        }
        let encoders = parsed
            .into_iter()
            .map(|(category, encoder)| (category, encoder.normalized()))
            .collect();
        Ok(Self { encoders })
    }

    pub fn get(&self, category: Category) -> Option<&LabelEncoder> {
        self.encoders.get(&category)
    }

    pub fn encode(&self, category: Category, token: &str) -> Result<usize> {
        match self.encoders.get(&category) {
            Some(encoder) => encoder.transform(category, token),
            None => Err(Error::UnknownCategoryValue {
                category,
                value: token.to_string(),
            }),
        }
    }

    /// Lookup-table tokens the encoders cannot encode, per category.
    pub fn missing_tokens(&self) -> Vec<(Category, &'static str)> {
        Category::ALL
            .into_iter()
            .flat_map(|category| {
                category
                    .tokens()
                    .filter(move |token| !self.get(category).is_some_and(|e| e.contains(token)))
                    .map(move |token| (category, token))
            })
            .collect()
    }
}
