//! External synthesizer bridge.
//!
//! Replaces the selection and concatenation stages for MBROLA-style
//! voices: each segment becomes one text line on the child's stdin,
//! `<name> <dur_ms> [<pct> <f0>]...`, and the child answers with raw
//! headerless 16-bit LE PCM on stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::audio::Waveform;
use crate::duration::segment_spans;
use crate::pipeline::{ProcessError, UtteranceProcessor};
use crate::utterance::{Utterance, TARGET};

/// One segment line: name, duration in milliseconds, then the pitch
/// targets inside the segment as percent-position / Hz pairs.
pub fn format_segment_line(name: &str, dur_ms: u32, targets: &[(u32, u32)]) -> String {
    let mut line = format!("{} {}", name, dur_ms);
    for (pct, f0) in targets {
        line.push_str(&format!(" {} {}", pct, f0));
    }
    line
}

/// Drives an external MBROLA-compatible binary over pipes.
pub struct MbrolaCaller {
    program: PathBuf,
    args: Vec<String>,
    sample_rate: u32,
}

impl MbrolaCaller {
    /// The standard invocation: `mbrola -e <database> - -.raw`.
    pub fn new(program: impl Into<PathBuf>, database: &Path, sample_rate: u32) -> Self {
        MbrolaCaller {
            program: program.into(),
            args: vec![
                "-e".to_string(),
                database.display().to_string(),
                "-".to_string(),
                "-.raw".to_string(),
            ],
            sample_rate,
        }
    }

    /// Escape hatch for non-standard wrappers: run `program` with exactly
    /// `args`.
    pub fn with_raw_command(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        sample_rate: u32,
    ) -> Self {
        MbrolaCaller {
            program: program.into(),
            args,
            sample_rate,
        }
    }

    fn run(&self, input: &str) -> Result<Vec<i16>, ProcessError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ProcessError::External(format!("cannot spawn {}: {}", self.program.display(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProcessError::External("synthesizer has no stdin".into()))?;
        let input = input.to_string();
        let writer = std::thread::spawn(move || {
            use std::io::Write;
            stdin.write_all(input.as_bytes())
        });

        let mut bytes = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            use std::io::Read;
            stdout
                .read_to_end(&mut bytes)
                .map_err(|e| ProcessError::External(format!("read from synthesizer: {}", e)))?;
        }
        let status = child
            .wait()
            .map_err(|e| ProcessError::External(format!("wait for synthesizer: {}", e)))?;
        let wrote = match writer.join() {
            Ok(result) => result,
            Err(_) => Ok(()),
        };
        if !status.success() {
            return Err(ProcessError::External(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }
        wrote.map_err(|e| ProcessError::External(format!("feed synthesizer: {}", e)))?;

        if bytes.len() % 2 != 0 {
            return Err(ProcessError::External(
                "synthesizer produced an odd byte count".into(),
            ));
        }
        Ok(bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }
}

/// Segment lines for the whole utterance, durations from the `end`
/// features and pitch targets from the Target relation.
pub(crate) fn pho_lines(utt: &Utterance) -> Result<Vec<String>, ProcessError> {
    let spans = segment_spans(utt)?;
    let mut targets: Vec<(f32, f32)> = Vec::new();
    if let Some(rel) = utt.relation(TARGET) {
        for item in utt.items(rel) {
            let f = utt.item_features(item);
            if let (Some(pos), Some(f0)) = (f.float("pos"), f.float("f0")) {
                targets.push((pos, f0));
            }
        }
    }

    let mut lines = Vec::with_capacity(spans.len());
    for (i, &(seg, start, end)) in spans.iter().enumerate() {
        let dur = (end - start).max(0.0);
        let dur_ms = (dur * 1000.0).round() as u32;
        let last = i + 1 == spans.len();
        let mut pairs = Vec::new();
        for &(pos, f0) in &targets {
            // Half-open spans, except the final segment keeps its end point.
            let inside = pos >= start && (pos < end || (last && pos <= end));
            if inside && dur > 0.0 {
                let pct = (((pos - start) / dur) * 100.0).round().clamp(0.0, 100.0) as u32;
                pairs.push((pct, f0.round().max(0.0) as u32));
            }
        }
        let name = utt.name(seg).unwrap_or_default();
        lines.push(format_segment_line(name, dur_ms, &pairs));
    }
    Ok(lines)
}

impl UtteranceProcessor for MbrolaCaller {
    fn name(&self) -> &'static str {
        "external_synthesizer"
    }

    fn process(&self, utt: &mut Utterance) -> Result<(), ProcessError> {
        let mut input = pho_lines(utt)?.join("\n");
        input.push('\n');
        let samples = self.run(&input)?;
        utt.waveform = Some(Waveform {
            sample_rate: self.sample_rate,
            samples,
        });
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::duration::Durator;
    use crate::features::FeatureSet;
    use crate::intonation::Intonation;
    use crate::lexicon::{PauseGenerator, Segmenter};
    use crate::normalize::TokenToWords;
    use crate::phrase::{PartOfSpeechTagger, Phraser};
    use crate::tokenizer::TokenizerStage;

    fn prepared(text: &str) -> Utterance {
        let mut utt = Utterance::new(text, Arc::new(FeatureSet::new()));
        TokenizerStage::default().process(&mut utt).unwrap();
        TokenToWords::default().process(&mut utt).unwrap();
        PartOfSpeechTagger::default().process(&mut utt).unwrap();
        Phraser::default().process(&mut utt).unwrap();
        Segmenter::default().process(&mut utt).unwrap();
        PauseGenerator.process(&mut utt).unwrap();
        Durator::default().process(&mut utt).unwrap();
        Intonation::default().process(&mut utt).unwrap();
        utt
    }

    #[test]
    fn test_format_segment_line() {
        assert_eq!(
            format_segment_line("a", 120, &[(25, 110), (75, 95)]),
            "a 120 25 110 75 95"
        );
        assert_eq!(format_segment_line("pau", 200, &[]), "pau 200");
    }

    #[test]
    fn test_pho_lines_cover_segments() {
        let utt = prepared("time");
        let lines = pho_lines(&utt).unwrap();
        // pau t ay m pau; the phrase baseline spans t..m, so the leading
        // pau carries no target and the phrase-final one lands in the
        // closing pau.
        assert_eq!(lines.len(), 5, "got: {:?}", lines);
        assert_eq!(lines[0], "pau 200");
        assert!(lines[1].starts_with("t 93 0 111"), "got: {}", lines[1]);
        assert_eq!(lines[4], "pau 200 0 100");
    }

    #[cfg(unix)]
    #[test]
    fn test_caller_reads_raw_pcm() {
        let mut utt = prepared("a");
        let caller = MbrolaCaller::with_raw_command(
            "sh",
            vec![
                "-c".to_string(),
                r"cat >/dev/null && printf '\001\000\002\000'".to_string(),
            ],
            8000,
        );
        caller.process(&mut utt).unwrap();
        let wave = utt.waveform.as_ref().unwrap();
        assert_eq!(wave.sample_rate, 8000);
        assert_eq!(wave.samples, vec![1, 2]);
    }

    #[cfg(unix)]
    #[test]
    fn test_caller_reports_exit_failure() {
        let mut utt = prepared("a");
        let caller = MbrolaCaller::with_raw_command(
            "sh",
            vec!["-c".to_string(), "exit 3".to_string()],
            8000,
        );
        let err = caller.process(&mut utt).unwrap_err();
        match err {
            ProcessError::External(msg) => assert!(msg.contains("exited"), "got: {}", msg),
            other => panic!("got: {:?}", other),
        }
    }

    #[test]
    fn test_caller_missing_binary() {
        let mut utt = prepared("a");
        let caller = MbrolaCaller::with_raw_command("/nonexistent/uv-mbrola", vec![], 8000);
        let err = caller.process(&mut utt).unwrap_err();
        assert!(matches!(err, ProcessError::External(_)));
    }
}
