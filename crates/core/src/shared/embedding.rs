use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies the model that produced an embedding.
///
/// Embeddings are only comparable when their model versions are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelVersion {
    name: String,
    version: String,
}

impl ModelVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for ModelVersion {
    type Err = String;

    /// Parses the `name@version` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('@') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(format!("invalid model version '{s}', expected name@version")),
        }
    }
}

/// Fixed-length identity signature of a face.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    values: Vec<f32>,
    model: ModelVersion,
}

impl Embedding {
    pub fn new(values: Vec<f32>, model: ModelVersion) -> Self {
        Self { values, model }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn model(&self) -> &ModelVersion {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_comparable_with(&self, other: &Embedding) -> bool {
        self.model == other.model && self.values.len() == other.values.len()
    }
}

/// Scales `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn arcface() -> ModelVersion {
        ModelVersion::new("arcface", "1")
    }

    #[test]
    fn test_model_version_display() {
        assert_eq!(arcface().to_string(), "arcface@1");
    }

    #[rstest]
    #[case::simple("arcface@1", "arcface", "1")]
    #[case::name_with_at("hsv@hist@2", "hsv@hist", "2")]
    fn test_model_version_parse(#[case] input: &str, #[case] name: &str, #[case] version: &str) {
        let parsed: ModelVersion = input.parse().unwrap();
        assert_eq!(parsed.name(), name);
        assert_eq!(parsed.version(), version);
    }

    #[rstest]
    #[case::no_separator("arcface")]
    #[case::empty_version("arcface@")]
    #[case::empty_name("@1")]
    fn test_model_version_parse_rejects(#[case] input: &str) {
        assert!(input.parse::<ModelVersion>().is_err());
    }

    #[test]
    fn test_comparable_requires_same_model() {
        let a = Embedding::new(vec![1.0, 0.0], arcface());
        let b = Embedding::new(vec![0.0, 1.0], ModelVersion::new("arcface", "2"));
        assert!(!a.is_comparable_with(&b));
        assert!(a.is_comparable_with(&a.clone()));
    }

    #[test]
    fn test_comparable_requires_same_length() {
        let a = Embedding::new(vec![1.0, 0.0], arcface());
        let b = Embedding::new(vec![1.0, 0.0, 0.0], arcface());
        assert!(!a.is_comparable_with(&b));
    }

    #[test]
    fn test_serde_uses_plain_fields() {
        let e = Embedding::new(vec![0.5, 0.25], arcface());
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"values\":[0.5,0.25]"));
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
