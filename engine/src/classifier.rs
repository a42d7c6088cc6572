use crate::{
    error::AppError,
    types::{local_timestamp, Classification},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

pub const MAX_LENGTH: usize = 128;

pub const LABELS: [&str; 20] = [
    "Phishing (Email Scam, Fake Websites, Spear Phishing)",
    "Malware (Trojan, Ransomware, Spyware)",
    "Social Engineering (Pretexting, Baiting, Quid Pro Quo)",
    "Denial of Service (DoS/DDoS)",
    "SQL Injection (Classic, Blind, Time-Based)",
    "Cross-Site Scripting (XSS)",
    "Man-in-the-Middle (MitM)",
    "Identity Theft (Account Takeover, Financial Fraud, Medical Identity Theft)",
    "Brute Force Attacks (Credential Stuffing, Dictionary Attack, Reverse Brute Force)",
    "Zero-Day Exploit (Software Vulnerability, Hardware Exploit)",
    "Insider Threats (Malicious Insider, Negligent Insider)",
    "Rogue Software (Fake Antivirus, Scareware)",
    "Clickjacking (UI Redressing, Overlay Attack)",
    "Cryptojacking (Unauthorized Cryptocurrency Mining)",
    "Keylogging (Hardware Keyloggers, Software Keyloggers)",
    "Trojan Horse (Backdoor, Rootkit)",
    "Supply Chain Attacks (Software Update Attack, Hardware Compromise)",
    "Deepfake Attacks (Fake Identity, Voice Spoofing)",
    "Business Email Compromise (BEC) (CEO Fraud, Invoice Scam)",
    "Fake News & Disinformation (Misinformation, Manipulated Media)",
];

/// A pretrained model mapping text to a distribution over [`LABELS`].
pub trait TextClassifier: Send + Sync {
    fn predict(&self, text: &str) -> Result<Vec<f64>, AppError>;
}

/// Runs the model and picks the most probable label.
pub fn classify(model: &dyn TextClassifier, text: &str) -> Result<Classification, AppError> {
    let probabilities = model.predict(text)?;
    if probabilities.len() != LABELS.len() {
        return Err(AppError::ModelInference(format!(
            "expected {} class probabilities, got {}",
            LABELS.len(),
            probabilities.len()
        )));
    }
    if let Some(bad) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(AppError::ModelInference(format!("probability out of range: {}", bad)));
    }

    let (index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    debug!("Predicted class {} with confidence {:.3}", index, confidence);
    Ok(Classification {
        prediction: LABELS[index].to_string(),
        confidence,
        timestamp: local_timestamp(),
    })
}

/// Hashed bag-of-words linear model exported by the training pipeline.
///
/// `weights` holds one row of `buckets` values per label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearTextModel {
    pub version: String,
    pub buckets: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    pub bias: Vec<f64>,
    pub weights: Vec<Vec<f64>>,
}

fn default_max_length() -> usize {
    MAX_LENGTH
}

impl LinearTextModel {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let model: LinearTextModel = serde_json::from_str(&content)?;
        model.validate()?;
        info!(
            "Loaded text model from {}: version {}, {} buckets",
            path.display(),
            model.version,
            model.buckets
        );
        Ok(model)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.buckets == 0 || self.max_length == 0 {
            return Err(AppError::ModelInference(
                "model must have non-zero buckets and max_length".to_string(),
            ));
        }
        if self.bias.len() != LABELS.len() || self.weights.len() != LABELS.len() {
            return Err(AppError::ModelInference(format!(
                "model must have {} label rows",
                LABELS.len()
            )));
        }
        if let Some(row) = self.weights.iter().position(|w| w.len() != self.buckets) {
            return Err(AppError::ModelInference(format!(
                "weight row {} does not have {} buckets",
                row, self.buckets
            )));
        }
        Ok(())
    }

    /// Bucket ids for the first `max_length` tokens of `text`.
    pub fn tokenize(&self, text: &str) -> Vec<usize> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .take(self.max_length)
            .map(|t| bucket(t, self.buckets))
            .collect()
    }

    fn logits(&self, tokens: &[usize]) -> Vec<f64> {
        self.bias
            .iter()
            .zip(&self.weights)
            .map(|(bias, row)| bias + tokens.iter().map(|&t| row[t]).sum::<f64>())
            .collect()
    }
}

impl TextClassifier for LinearTextModel {
    fn predict(&self, text: &str) -> Result<Vec<f64>, AppError> {
        let tokens = self.tokenize(text);
        let probabilities = softmax(&self.logits(&tokens));
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(AppError::ModelInference("non-finite model output".to_string()));
        }
        Ok(probabilities)
    }
}

fn bucket(token: &str, buckets: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % buckets as u64) as usize
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_with(buckets: usize, max_length: usize) -> LinearTextModel {
        LinearTextModel {
            version: "test".to_string(),
            buckets,
            max_length,
            bias: vec![0.0; LABELS.len()],
            weights: vec![vec![0.0; buckets]; LABELS.len()],
        }
    }

    struct Fixed(Vec<f64>);

    impl TextClassifier for Fixed {
        fn predict(&self, _text: &str) -> Result<Vec<f64>, AppError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_prediction_is_a_known_label_with_valid_confidence() {
        let mut model = model_with(16, MAX_LENGTH);
        for (i, row) in model.weights.iter_mut().enumerate() {
            for (j, w) in row.iter_mut().enumerate() {
                *w = ((i * 7 + j * 3) % 11) as f64 - 5.0;
            }
        }

        for text in ["verify your account now", "", "SELECT * FROM users; --", "🙂 free bitcoin"] {
            let result = classify(&model, text).unwrap();
            assert!(LABELS.contains(&result.prediction.as_str()));
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }

    #[test]
    fn test_bias_selects_label() {
        let mut model = model_with(8, MAX_LENGTH);
        model.bias[4] = 10.0;
        let result = classify(&model, "anything at all").unwrap();
        assert_eq!(result.prediction, LABELS[4]);
        assert!(result.confidence > 0.99);
    }

    #[test]
    fn test_token_weights_drive_prediction() {
        let mut model = model_with(64, MAX_LENGTH);
        let ransom = bucket("ransomware", 64);
        model.weights[1][ransom] = 8.0;

        let result = classify(&model, "Your files were encrypted by RANSOMWARE").unwrap();
        assert_eq!(result.prediction, LABELS[1]);
    }

    #[test]
    fn test_tokenize_truncates() {
        let model = model_with(32, 3);
        assert_eq!(model.tokenize("one two three four five").len(), 3);
        assert_eq!(model.tokenize("a,b").len(), 2);
        assert!(model.tokenize("  ... ").is_empty());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1000.0, 1000.0, -1000.0]);
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((probs[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_wrong_distribution() {
        assert!(matches!(
            classify(&Fixed(vec![1.0; 3]), "x"),
            Err(AppError::ModelInference(_))
        ));

        let mut probs = vec![0.0; LABELS.len()];
        probs[0] = 1.5;
        assert!(matches!(
            classify(&Fixed(probs), "x"),
            Err(AppError::ModelInference(_))
        ));
    }

    #[test]
    fn test_load_from_file_validates_shape() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("model.json");
        std::fs::write(&good, serde_json::to_string(&model_with(4, 16)).unwrap()).unwrap();
        let loaded = LinearTextModel::load_from_file(&good).unwrap();
        assert_eq!(loaded.buckets, 4);

        let mut broken = model_with(4, 16);
        broken.weights[7].pop();
        let bad = dir.path().join("broken.json");
        std::fs::write(&bad, serde_json::to_string(&broken).unwrap()).unwrap();
        assert!(matches!(
            LinearTextModel::load_from_file(&bad),
            Err(AppError::ModelInference(_))
        ));

        assert!(matches!(
            LinearTextModel::load_from_file(dir.path().join("missing.json")),
            Err(AppError::Io(_))
        ));
    }
}
