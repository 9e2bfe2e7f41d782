// src/utils/progress_callback.rs - Progress reporting for long scans

use std::sync::Arc;

/// Takes a phase name and optional detail text.
pub type ProgressCallback = Arc<dyn Fn(String, Option<String>) + Send + Sync>;

pub fn report(callback: &Option<ProgressCallback>, phase: impl Into<String>, detail: Option<String>) {
    if let Some(cb) = callback {
        cb(phase.into(), detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_report_forwards_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: Option<ProgressCallback> = Some(Arc::new(move |phase, detail| {
            sink.lock().unwrap().push((phase, detail));
        }));

        report(&callback, "measure", Some("12 pairs".to_string()));
        report(&None, "ignored", None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("measure".to_string(), Some("12 pairs".to_string())));
    }
}
