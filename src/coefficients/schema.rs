use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// One category record exactly as it appears in the coefficient file.
///
/// Every field is optional here so that the validator can report a precise
/// message for a missing heading instead of a generic serde error.
#[derive(Debug, Deserialize)]
pub(super) struct RawCategory {
    #[serde(rename = "Instructions")]
    pub instructions: Option<Vec<String>>,
    #[serde(rename = "Constant")]
    pub constant: Option<f64>,
    #[serde(rename = "Coefficients")]
    pub coefficients: Option<HashMap<String, Vec<f64>>>,
}

/// Top level of the coefficient file: category records in file order.
#[derive(Debug)]
pub(super) struct RawDefinition(pub Vec<(String, RawCategory)>);

/// Custom deserializer keeping the categories in the order of the file.
// The first category decides the interaction terms, so a sorted or hashed map
// would change which category is consulted.
impl<'de> Deserialize<'de> for RawDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};
        use std::fmt;

        struct CategoriesVisitor;

        impl<'de> Visitor<'de> for CategoriesVisitor {
            type Value = RawDefinition;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of category names to coefficient categories")
            }

            fn visit_map<A>(self, mut map: A) -> Result<RawDefinition, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut categories: Vec<(String, RawCategory)> = Vec::new();

                while let Some((name, category)) = map.next_entry::<String, RawCategory>()? {
                    if categories.iter().any(|(existing, _)| *existing == name) {
                        return Err(de::Error::custom(format!(
                            "Category '{}' is defined more than once",
                            name
                        )));
                    }
                    categories.push((name, category));
                }

                Ok(RawDefinition(categories))
            }
        }

        deserializer.deserialize_map(CategoriesVisitor)
    }
}
