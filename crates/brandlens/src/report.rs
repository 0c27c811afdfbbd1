//! Final-report generation. The generator is a black box to the planner: it
//! reads whatever analysis artifacts exist on disk and renders one HTML
//! file. Missing artifacts thin the report, they never fail it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Render the artifacts found in `data_dir` into `output_path` and
    /// return the written path.
    async fn generate(&self, data_dir: &Path, output_path: &Path) -> Result<PathBuf>;
}

/// Self-contained HTML renderer over the `*_analysis.json` artifacts.
pub struct HtmlReportGenerator;

impl HtmlReportGenerator {
    fn load_artifacts(data_dir: &Path) -> Vec<Value> {
        let Ok(entries) = std::fs::read_dir(data_dir) else {
            return Vec::new();
        };
        let mut names: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with("_analysis.json"))
            })
            .collect();
        names.sort();

        names
            .into_iter()
            .filter_map(|path| {
                let text = std::fs::read_to_string(&path).ok()?;
                match serde_json::from_str(&text) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable artifact");
                        None
                    }
                }
            })
            .collect()
    }

    fn render(reports: &[Value]) -> String {
        let date = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
        let mut sections = String::new();
        for report in reports {
            let title = report
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Analysis");
            sections.push_str(&format!("<section>\n<h2>{}</h2>\n", escape(title)));
            if let Some(insights) = report.get("insights").and_then(Value::as_array) {
                for insight in insights {
                    if let Some(content) = insight.get("content").and_then(Value::as_str) {
                        sections.push_str(&format!("<p>{}</p>\n", escape(content)));
                    }
                }
            }
            sections.push_str("</section>\n");
        }
        if sections.is_empty() {
            sections.push_str("<p>No analysis artifacts were produced for this run.</p>\n");
        }

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Brand competition report</title>\n\
             <style>body{{font-family:sans-serif;max-width:60rem;margin:2rem auto}}\
             section{{margin-bottom:2rem}}</style>\n</head>\n<body>\n\
             <h1>Brand competition report</h1>\n<p class=\"date\">{}</p>\n{}\
             </body>\n</html>\n",
            date, sections
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl ReportGenerator for HtmlReportGenerator {
    async fn generate(&self, data_dir: &Path, output_path: &Path) -> Result<PathBuf> {
        let reports = Self::load_artifacts(data_dir);
        tracing::info!(artifacts = reports.len(), "rendering final report");
        let html = Self::render(&reports);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        std::fs::write(output_path, html)
            .with_context(|| format!("writing report to {}", output_path.display()))?;
        Ok(output_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_report_includes_existing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("brand_mentions_analysis.json"),
            json!({"title": "Share of voice", "insights": [{"content": "alpha leads"}]})
                .to_string(),
        )
        .unwrap();

        let out = dir.path().join("reports/final_report.html");
        let generator = HtmlReportGenerator;
        let written = generator.generate(dir.path(), &out).await.unwrap();

        let html = std::fs::read_to_string(written).unwrap();
        assert!(html.contains("Share of voice"));
        assert!(html.contains("alpha leads"));
    }

    #[tokio::test]
    async fn test_missing_artifacts_thin_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("final_report.html");
        let generator = HtmlReportGenerator;
        generator.generate(dir.path(), &out).await.unwrap();

        let html = std::fs::read_to_string(out).unwrap();
        assert!(html.contains("No analysis artifacts"));
    }
}
