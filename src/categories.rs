//! Static lookup tables from human-readable labels to the tokens the model
//! was trained on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One categorical input of the model. The serde names are the keys the
/// fitted encoders are stored under in `label_encoders.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Produto")]
    Product,
    #[serde(rename = "Mes")]
    Month,
    #[serde(rename = "estado")]
    State,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Product, Category::Month, Category::State];

    /// Key used for this category in the encoder artifact.
    pub fn artifact_key(self) -> &'static str {
        match self {
            Category::Product => "Produto",
            Category::Month => "Mes",
            Category::State => "estado",
        }
    }

    /// (label, token) pairs in display order.
    pub fn table(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Category::Product => PRODUCTS,
            Category::Month => MONTHS,
            Category::State => STATES,
        }
    }

    pub fn labels(self) -> impl Iterator<Item = &'static str> {
        self.table().iter().map(|(label, _)| *label)
    }

    pub fn tokens(self) -> impl Iterator<Item = &'static str> {
        self.table().iter().map(|(_, token)| *token)
    }

    /// Resolve a label to its model token.
    ///
    /// Exact label matches win. A value that already is a token, or a label
    /// differing only in case, is accepted too, so `"soja"` and `"SOJA"` both
    /// resolve to the `Soja` entry.
    pub fn token_for(self, label: &str) -> Result<&'static str> {
        let label = label.trim();
        let table = self.table();
        table
            .iter()
            .find(|(l, _)| *l == label)
            .or_else(|| table.iter().find(|(_, t)| *t == label))
            .or_else(|| {
                let lower = label.to_lowercase();
                table.iter().find(|(l, _)| l.to_lowercase() == lower)
            })
            .map(|(_, token)| *token)
            .ok_or_else(|| Error::UnknownCategoryValue {
                category: self,
                value: label.to_string(),
            })
    }

    /// Human-readable label for a value accepted by [`Category::token_for`].
    pub fn display_label(self, label: &str) -> Option<&'static str> {
        let token = self.token_for(label).ok()?;
        self.table()
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(l, _)| *l)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Product => "product",
            Category::Month => "month",
            Category::State => "state",
        };
        f.write_str(name)
    }
}

const PRODUCTS: &[(&str, &str)] = &[
    ("Cana-de-Açúcar", "Cana_de_acucar"),
    ("Cereais (outros)", "cereais"),
    ("Soja", "soja"),
    ("Milho", "milho"),
    ("Laranja", "laranja"),
];

const MONTHS: &[(&str, &str)] = &[
    ("Janeiro", "Janeiro"),
    ("Fevereiro", "fevereiro"),
    ("Março", "marco"),
    ("Abril", "abril"),
    ("Maio", "maio"),
    ("Junho", "junho"),
    ("Julho", "julho"),
];

const STATES: &[(&str, &str)] = &[
    ("Rondônia", "rondonia"),
    ("Acre", "acre"),
    ("Amazonas", "amazonas"),
    ("Roraima", "roraima"),
    ("Pará", "para"),
    ("Amapá", "amapa"),
    ("Tocantins", "tocantins"),
    ("Maranhão", "maranhao"),
    ("Piauí", "piaui"),
    ("Ceará", "ceara"),
    ("Rio Grande do Norte", "rio_grande_do_norte"),
    ("Paraíba", "paraiba"),
    ("Pernambuco", "pernambuco"),
    ("Alagoas", "alagoas"),
    ("Sergipe", "sergipe"),
    ("Bahia", "bahia"),
    ("Minas Gerais", "minas_gerais"),
    ("Espírito Santo", "espirito_santo"),
    ("Rio de Janeiro", "rio_de_janeiro"),
    ("São Paulo", "sao_paulo"),
    ("Paraná", "parana"),
    ("Santa Catarina", "santa_catarina"),
    ("Rio Grande do Sul", "rio_grande_do_sul"),
    ("Mato Grosso do Sul", "mato_grosso_do_sul"),
    ("Mato Grosso", "mato_grosso"),
    ("Goiás", "goias"),
    ("Distrito Federal", "distrito_federal"),
];
