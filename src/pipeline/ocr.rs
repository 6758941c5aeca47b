//! OCR collaborator: image bytes → plain text + per-token layout.
//!
//! The classifier needs two things from OCR: the recognised text (to decide
//! whether an image is text-dominant) and the token boxes with confidences
//! (to mask text regions during the graphic-density check). Both come from a
//! single tesseract run in TSV mode; the plain text is rebuilt from the word
//! rows so the engine is only invoked once per image.
//!
//! ## Why a synchronous trait?
//!
//! OCR runs inside the extract phase, which already lives on a
//! `spawn_blocking` thread next to pdfium. A blocking call here is the honest
//! signature.

use crate::error::OcrError;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// One recognised word.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// 0–100; tesseract reports -1 for structural rows, which are dropped.
    pub confidence: f32,
}

impl OcrToken {
    /// `(x0, y0, x1, y1)` in image pixels.
    pub fn rect(&self) -> (u32, u32, u32, u32) {
        (
            self.left,
            self.top,
            self.left.saturating_add(self.width),
            self.top.saturating_add(self.height),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    /// Recognised text, trimmed. Empty when nothing was detected.
    pub text: String,
    pub tokens: Vec<OcrToken>,
}

/// Anything that can read text out of an encoded image.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &[u8]) -> Result<OcrOutput, OcrError>;
}

/// Runs the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: PathBuf,
    language: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl TesseractOcr {
    /// Uses `TESSERACT_CMD_PATH` when set, otherwise `tesseract` from `PATH`.
    pub fn new(language: impl Into<String>) -> Self {
        let command = std::env::var_os("TESSERACT_CMD_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tesseract"));
        Self {
            command,
            language: language.into(),
        }
    }

    pub fn with_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.command = command.into();
        self
    }

    /// True when the binary can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.command).arg("--version").output().is_ok()
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8]) -> Result<OcrOutput, OcrError> {
        let mut input = tempfile::Builder::new()
            .prefix("ocr_input_")
            .tempfile()?;
        input.write_all(image)?;
        input.flush()?;

        let output = Command::new(&self.command)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("tsv")
            .output()
            .map_err(|e| OcrError::Unavailable(format!("{}: {}", self.command.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Processing(stderr.trim().to_string()));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_tsv(&tsv);
        debug!(
            "tesseract: {} tokens, {} chars",
            parsed.tokens.len(),
            parsed.text.len()
        );
        Ok(parsed)
    }
}

/// Parse tesseract's TSV output.
///
/// Word rows (level 5) become tokens; text is rebuilt with spaces between
/// words, newlines between lines and a blank line between paragraphs.
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut last_line: Option<(u32, u32, u32)> = None;
    let mut last_par: Option<(u32, u32)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let (block, par, line) = (num(2), num(3), num(4));

        match last_line {
            Some(prev) if prev == (block, par, line) => text.push(' '),
            Some(_) if last_par == Some((block, par)) => text.push('\n'),
            Some(_) => text.push_str("\n\n"),
            None => {}
        }
        text.push_str(word);
        last_line = Some((block, par, line));
        last_par = Some((block, par));

        let confidence = cols[10].trim().parse::<f32>().unwrap_or(-1.0);
        if confidence < 0.0 {
            continue;
        }
        tokens.push(OcrToken {
            text: word.to_string(),
            left: num(6),
            top: num(7),
            width: num(8),
            height: num(9),
            confidence,
        });
    }

    OcrOutput {
        text: text.trim().to_string(),
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn parse_tsv_rebuilds_lines_and_paragraphs() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t200\t100\t-1\t\n\
             5\t1\t1\t1\t1\t1\t10\t10\t30\t12\t96.5\tHello\n\
             5\t1\t1\t1\t1\t2\t45\t10\t40\t12\t91\tworld\n\
             5\t1\t1\t1\t2\t1\t10\t30\t50\t12\t88\tsecond\n\
             5\t1\t2\t1\t1\t1\t10\t60\t50\t12\t12\tnext\n"
        );
        let out = parse_tsv(&tsv);
        assert_eq!(out.text, "Hello world\nsecond\n\nnext");
        assert_eq!(out.tokens.len(), 4);
        assert_eq!(out.tokens[0].rect(), (10, 10, 40, 22));
        assert!((out.tokens[3].confidence - 12.0).abs() < f32::EPSILON);
    }

    #[test]
    fn parse_tsv_empty_output() {
        let out = parse_tsv(HEADER);
        assert!(out.text.is_empty());
        assert!(out.tokens.is_empty());
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let ocr = TesseractOcr::default().with_command("/definitely/not/tesseract");
        assert!(!ocr.is_available());
        match ocr.recognize(b"not an image") {
            Err(OcrError::Unavailable(_)) => {}
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
