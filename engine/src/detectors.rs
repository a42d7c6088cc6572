use crate::types::{DetectionRecord, Severity};

const SUSPICIOUS_IMAGE_KEYWORDS: &[&str] = &["threat", "malware"];

/// Flags image URLs whose text mentions a suspicious keyword.
pub fn scan_image_urls(images: &[String]) -> Vec<DetectionRecord> {
    images
        .iter()
        .filter(|url| {
            let url = url.to_lowercase();
            SUSPICIOUS_IMAGE_KEYWORDS.iter().any(|k| url.contains(k))
        })
        .map(|_| {
            DetectionRecord::new(
                "Suspicious Image Detected",
                Severity::High,
                "Malware Image",
                "Infection/Exploitation",
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_urls_are_flagged() {
        let images = vec![
            "https://cdn.test/img/cat.png".to_string(),
            "https://cdn.test/MALWARE-dropper.gif".to_string(),
            "https://threat.cdn.test/banner.jpg".to_string(),
        ];

        let records = scan_image_urls(&images);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.label == "Suspicious Image Detected"));
        assert!(records.iter().all(|r| r.severity == Severity::High));
    }

    #[test]
    fn test_empty_input() {
        assert!(scan_image_urls(&[]).is_empty());
    }
}
