//! Minijinja template rendering for report emails.
//!
//! Renders the subject and HTML body of a monitoring report from a
//! [`ReportContext`]. Templates are plain strings, so a fresh
//! [`minijinja::Environment`] is created per render call.

use serde::Serialize;
use vibesense_core::{AggregateReport, MonitoringJob, PipelineMessage, SentimentLabel};

use crate::traits::{Notification, NotifyError};

pub const SUBJECT_TEMPLATE: &str =
    "🚀 VibeSense Alert: Fresh Insights for Your Video - {{ post_title }}";

pub const BODY_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>
  .container { font-family: sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; border: 1px solid #ddd; padding: 20px; border-radius: 8px; }
  .header { font-size: 24px; font-weight: bold; color: #0056b3; margin-bottom: 15px; }
  .section-title { font-size: 18px; font-weight: bold; color: #444; margin-top: 20px; margin-bottom: 10px; border-bottom: 1px solid #eee; padding-bottom: 5px; }
  .highlight-card { background-color: #f9f9f9; padding: 15px; border-radius: 5px; margin-bottom: 15px; }
  .sentiment-positive { color: #28a745; font-weight: bold; }
  .sentiment-negative { color: #dc3545; font-weight: bold; }
  .footer { font-size: 12px; color: #777; margin-top: 20px; text-align: center; }
</style>
</head>
<body>
  <div class="container">
    <div class="header">🚀 VibeSense Alert</div>
    <p>Hi {{ recipient_name }},</p>
    <p>We've analyzed the latest comments on your video <strong>"{{ post_title }}"</strong> for the past {{ interval_hours | round(1) }} hours up to {{ interval_timestamp }}. Here's what the buzz is saying:</p>

    <div class="section-title">🌟 Interval Highlights</div>
    <div class="highlight-card">
      <p>Average Sentiment: <span class="sentiment-{{ interval_sentiment | lower }}">{{ interval_sentiment }}</span> (Confidence: {{ interval_confidence }})</p>
    </div>

    <div class="section-title">📈 Overall Trends So Far</div>
    <div class="highlight-card">
      <p>Average Sentiment: <span class="sentiment-{{ overall_sentiment | lower }}">{{ overall_sentiment }}</span> (Confidence: {{ overall_confidence }})</p>
      <p>95% interval: {{ ci_low | round(2) }} to {{ ci_high | round(2) }} over {{ sample_count }} batch{% if sample_count != 1 %}es{% endif %}</p>
    </div>
{% if summary %}
    <div class="section-title">💬 What People Are Saying</div>
    <div class="highlight-card"><p>{{ summary }}</p></div>
{% endif %}
    <div class="footer">
      <p>Stay tuned for more,<br>The VibeSense Team</p>
    </div>
  </div>
</body>
</html>
"#;

/// Data available to the report templates.
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub recipient_name: String,
    pub post_title: String,
    /// Fetch interval length in hours.
    pub interval_hours: f64,
    /// Causation timestamp of the reported interval, human formatted.
    pub interval_timestamp: String,
    /// `Positive` or `Negative`.
    pub interval_sentiment: String,
    /// Confidence as a percentage string, e.g. `87.5%`.
    pub interval_confidence: String,
    pub overall_sentiment: String,
    pub overall_confidence: String,
    pub ci_low: f64,
    pub ci_high: f64,
    pub sample_count: usize,
    pub summary: Option<String>,
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

impl ReportContext {
    pub fn new(job: &MonitoringJob, message: &PipelineMessage<AggregateReport>) -> Self {
        let aggregate = &message.payload.aggregate;
        Self {
            recipient_name: job
                .recipient_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "there".to_string()),
            post_title: job.display_title.clone(),
            interval_hours: job.interval_hours(),
            interval_timestamp: message
                .causation_timestamp
                .format("%B %d, %Y at %I:%M %p UTC")
                .to_string(),
            interval_sentiment: SentimentLabel::classify_score(aggregate.interval_sentiment)
                .to_string(),
            interval_confidence: percent(aggregate.interval_confidence),
            overall_sentiment: SentimentLabel::classify_score(aggregate.overall_sentiment)
                .to_string(),
            overall_confidence: percent(aggregate.overall_confidence),
            ci_low: aggregate.confidence_interval.0,
            ci_high: aggregate.confidence_interval.1,
            sample_count: aggregate.sample_count,
            summary: message.payload.summary.clone(),
        }
    }
}

/// Renders report templates using minijinja.
#[derive(Debug)]
pub struct TemplateRenderer {
    subject: String,
    body: String,
}

impl TemplateRenderer {
    /// Renderer for the built-in report templates.
    pub fn new() -> Self {
        Self::with_templates(SUBJECT_TEMPLATE, BODY_TEMPLATE)
    }

    pub fn with_templates(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env.add_filter("lower", lower_filter);
        env
    }

    /// Render subject and body for `ctx`.
    pub fn render(&self, ctx: &ReportContext) -> Result<Notification, NotifyError> {
        let env = Self::build_env();
        let subject = env
            .render_str(&self.subject, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        let body = env
            .render_str(&self.body, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(Notification {
            subject: subject.trim().to_string(),
            body,
        })
    }

    /// Check that both templates parse.
    pub fn validate(&self) -> Result<(), NotifyError> {
        let env = Self::build_env();
        for source in [&self.subject, &self.body] {
            env.template_from_str(source)
                .map_err(|e| NotifyError::Template(e.to_string()))?;
        }
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}

fn lower_filter(value: String) -> String {
    value.to_lowercase()
}
