use ko2anki_lib::pipeline::{DocumentState, RunReport};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const GRAY: &str = "\x1b[90m";
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

/// One line per document, then a totals line
pub fn summary(report: &RunReport, use_color: bool) -> String {
    let mut lines = Vec::new();

    for doc in &report.documents {
        let name = doc
            .title
            .clone()
            .unwrap_or_else(|| doc.source.display().to_string());
        let line = match &doc.state {
            DocumentState::Exported { path } => format!(
                "{} {} {}",
                paint("ok    ", Color::GREEN, use_color),
                name,
                paint(
                    &format!("({} cards, {} skipped) -> {}", doc.cards, doc.warnings, path.display()),
                    Color::GRAY,
                    use_color
                )
            ),
            DocumentState::Failed { stage, reason } => format!(
                "{} {} {}",
                paint("failed", Color::RED, use_color),
                name,
                paint(&format!("({} failed: {})", stage, reason), Color::GRAY, use_color)
            ),
            other => format!("{:?} {}", other, name),
        };
        lines.push(line);
    }

    let totals = format!(
        "{} of {} books exported, {} cards",
        report.exported(),
        report.documents.len(),
        report.cards()
    );
    lines.push(String::new());
    lines.push(paint(&totals, Color::BOLD, use_color));
    lines.join("\n")
}

/// Machine-readable report
pub fn summary_json(report: &RunReport) -> serde_json::Value {
    let documents: Vec<serde_json::Value> = report
        .documents
        .iter()
        .map(|doc| {
            let (status, path, stage, reason) = match &doc.state {
                DocumentState::Exported { path } => {
                    ("exported", Some(path.to_string_lossy().to_string()), None, None)
                }
                DocumentState::Failed { stage, reason } => {
                    ("failed", None, Some(stage.to_string()), Some(reason.clone()))
                }
                _ => ("pending", None, None, None),
            };
            serde_json::json!({
                "source": doc.source.to_string_lossy(),
                "title": doc.title,
                "status": status,
                "package": path,
                "stage": stage,
                "reason": reason,
                "cards": doc.cards,
                "warnings": doc.warnings,
            })
        })
        .collect();

    serde_json::json!({
        "succeeded": report.succeeded(),
        "exported": report.exported(),
        "failed": report.failed(),
        "cards": report.cards(),
        "documents": documents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ko2anki_lib::pipeline::{DocumentReport, Stage};
    use std::path::{Path, PathBuf};

    fn report() -> RunReport {
        let mut ok = DocumentReport::new(Path::new("Dune.sdr/metadata.epub.lua"));
        ok.title = Some("Dune".to_string());
        ok.cards = 4;
        ok.state = DocumentState::Exported { path: PathBuf::from("out/Dune.apkg") };
        let mut bad = DocumentReport::new(Path::new("Emma.sdr/metadata.epub.lua"));
        bad.state = DocumentState::Failed {
            stage: Stage::Load,
            reason: "Syntax error".to_string(),
        };
        RunReport { documents: vec![ok, bad] }
    }

    #[test]
    fn test_plain_summary() {
        let text = summary(&report(), false);
        assert!(text.contains("ok     Dune (4 cards, 0 skipped) -> out/Dune.apkg"));
        assert!(text.contains("failed Emma.sdr/metadata.epub.lua (load failed: Syntax error)"));
        assert!(text.ends_with("1 of 2 books exported, 4 cards"));
    }

    #[test]
    fn test_json_summary() {
        let json = summary_json(&report());
        assert_eq!(json["succeeded"], true);
        assert_eq!(json["documents"][0]["status"], "exported");
        assert_eq!(json["documents"][1]["stage"], "load");
    }
}
