//! Pure statistics over interval samples.

use vibesense_core::{Aggregate, AnalysisResult, Classify, ErrorKind, IntervalResult};

/// Two-sided 95% quantile of the standard normal distribution.
const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StatsError {
    #[error("no samples to aggregate")]
    InsufficientData,
}

impl Classify for StatsError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }
}

/// Mean with a 95% normal confidence interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub confidence_interval: (f64, f64),
    pub n: usize,
}

/// Mean and 95% confidence interval of `samples`.
///
/// The interval uses the sample standard deviation; a single sample yields a
/// zero-width interval at the mean.
pub fn aggregate(samples: &[f64]) -> Result<Summary, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::InsufficientData);
    }
    let n = samples.len();
    let mean = mean(samples);
    if n == 1 {
        return Ok(Summary {
            mean,
            confidence_interval: (mean, mean),
            n,
        });
    }
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let half_width = Z_95 * variance.sqrt() / (n as f64).sqrt();
    Ok(Summary {
        mean,
        confidence_interval: (mean - half_width, mean + half_width),
        n,
    })
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Mean sentiment score and mean confidence of one analyzed batch.
pub fn interval_means(results: &[AnalysisResult]) -> Result<(f64, f64), StatsError> {
    if results.is_empty() {
        return Err(StatsError::InsufficientData);
    }
    let scores: Vec<f64> = results.iter().map(|r| r.sentiment.score()).collect();
    let confidences: Vec<f64> = results.iter().map(|r| r.confidence).collect();
    Ok((mean(&scores), mean(&confidences)))
}

/// Recompute the running aggregate from a job's full history.
///
/// `current` supplies the interval figures; the overall figures come from
/// every row in `history`. Feeding the same history twice yields the same
/// result, so redelivered batches never double-count.
pub fn overall(current: &IntervalResult, history: &[IntervalResult]) -> Result<Aggregate, StatsError> {
    let sentiments: Vec<f64> = history.iter().map(|r| r.avg_sentiment).collect();
    let confidences: Vec<f64> = history.iter().map(|r| r.avg_confidence).collect();
    let sentiment = aggregate(&sentiments)?;
    let confidence = aggregate(&confidences)?;
    Ok(Aggregate {
        interval_sentiment: current.avg_sentiment,
        interval_confidence: current.avg_confidence,
        overall_sentiment: sentiment.mean,
        overall_confidence: confidence.mean,
        confidence_interval: sentiment.confidence_interval,
        sample_count: sentiment.n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibesense_core::SentimentLabel;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_input_is_insufficient() {
        assert_eq!(aggregate(&[]), Err(StatsError::InsufficientData));
        assert_eq!(interval_means(&[]), Err(StatsError::InsufficientData));
    }

    #[test]
    fn single_sample_has_degenerate_interval() {
        let s = aggregate(&[0.4]).unwrap();
        assert_eq!(s.mean, 0.4);
        assert_eq!(s.confidence_interval, (0.4, 0.4));
    }

    #[test]
    fn interval_uses_sample_std() {
        // mean 0.5, sample std 0.5773..., n = 4
        let s = aggregate(&[0.0, 1.0, 0.0, 1.0]).unwrap();
        assert!(close(s.mean, 0.5));
        let half = Z_95 * (1.0f64 / 3.0).sqrt() / 2.0;
        assert!(close(s.confidence_interval.0, 0.5 - half));
        assert!(close(s.confidence_interval.1, 0.5 + half));
    }

    #[test]
    fn batch_means_use_label_scores() {
        let result = |sentiment, confidence| AnalysisResult {
            comment_id: None,
            sentiment,
            confidence,
            summary: None,
        };
        let (sentiment, confidence) = interval_means(&[
            result(SentimentLabel::Positive, 0.9),
            result(SentimentLabel::Negative, 0.7),
            result(SentimentLabel::Neutral, 0.8),
            result(SentimentLabel::Positive, 0.6),
        ])
        .unwrap();
        assert!(close(sentiment, 0.625));
        assert!(close(confidence, 0.75));
    }
}
