use super::ClassifierError;
use serde::Serialize;

/// Maps identity strings to dense class indices in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut classes: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, label: &str) -> Result<usize, ClassifierError> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| ClassifierError::UnknownLabel(label.to_string()))
    }

    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, ClassifierError> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn inverse(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_dense_codes() {
        let enc = LabelEncoder::fit(&["Tony_Blair", "Ariel_Sharon", "Tony_Blair", "Colin_Powell"]);
        assert_eq!(enc.classes(), &["Ariel_Sharon", "Colin_Powell", "Tony_Blair"]);
        assert_eq!(enc.transform(&["Tony_Blair", "Ariel_Sharon"]).unwrap(), vec![2, 0]);
        assert_eq!(enc.inverse(1), Some("Colin_Powell"));
        assert_eq!(enc.inverse(3), None);
    }

    #[test]
    fn test_unknown_label() {
        let enc = LabelEncoder::fit(&["a", "b"]);
        assert_eq!(enc.encode("c"), Err(ClassifierError::UnknownLabel("c".into())));
    }
}
