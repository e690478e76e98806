//! Flat-text polar table parsing.
//!
//! Accepts the common "AeroDyn-style" layout: free-form header lines, then
//! whitespace-separated data rows of
//!
//! ```text
//! alpha_deg  cl  cd  [cm]
//! ```
//!
//! Multiple Reynolds blocks may appear in one file, each introduced by a
//! line beginning with `Re` (case-insensitive) followed by the Reynolds
//! number, e.g. `Re 1.5e6`. Lines that are not data rows and not block
//! markers (comments, titles, column headers, single numbers) are skipped.

use crate::{Polar, PolarError};

/// Parse a polar file body into `(reynolds, polar)` blocks.
///
/// A file without any `Re` marker yields a single block with the default
/// Reynolds number `1e6`. Column count (3 vs. 4) must be consistent within
/// a block; the 4th column, when present, is cm.
pub fn parse_flat_table(text: &str) -> Result<Vec<(f64, Polar)>, PolarError> {
    struct Block {
        re: f64,
        alpha: Vec<f64>,
        cl: Vec<f64>,
        cd: Vec<f64>,
        cm: Vec<f64>,
        has_cm: Option<bool>,
    }

    impl Block {
        fn new(re: f64) -> Self {
            Self { re, alpha: Vec::new(), cl: Vec::new(), cd: Vec::new(), cm: Vec::new(), has_cm: None }
        }

        fn finish(self) -> Result<Option<(f64, Polar)>, PolarError> {
            if self.alpha.is_empty() {
                return Ok(None);
            }
            let cm = if self.has_cm == Some(true) { Some(self.cm) } else { None };
            Ok(Some((self.re, Polar::new(self.alpha, self.cl, self.cd, cm)?)))
        }
    }

    const DEFAULT_RE: f64 = 1e6;
    let mut blocks: Vec<(f64, Polar)> = Vec::new();
    let mut current = Block::new(DEFAULT_RE);

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        // Block marker: "Re 1.5e6" / "RE: 2e6"
        let lower = line.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("re") {
            let rest = rest.trim_start_matches([':', '=']).trim();
            if let Ok(re) = rest.parse::<f64>() {
                if !re.is_finite() || re <= 0.0 {
                    return Err(PolarError::Parse {
                        line: idx + 1,
                        msg: format!("non-positive Reynolds number {re}"),
                    });
                }
                if let Some(done) = current.finish()? {
                    blocks.push(done);
                }
                current = Block::new(re);
                continue;
            }
        }

        let fields: Vec<f64> = line
            .split_whitespace()
            .map_while(|tok| tok.parse::<f64>().ok())
            .collect();
        match fields.len() {
            3 | 4 => {
                let has_cm = fields.len() == 4;
                if *current.has_cm.get_or_insert(has_cm) != has_cm {
                    return Err(PolarError::Parse {
                        line: idx + 1,
                        msg: "inconsistent column count within block".to_string(),
                    });
                }
                current.alpha.push(fields[0]);
                current.cl.push(fields[1]);
                current.cd.push(fields[2]);
                if has_cm {
                    current.cm.push(fields[3]);
                }
            }
            // header/title material; skip
            _ => {}
        }
    }

    if let Some(done) = current.finish()? {
        blocks.push(done);
    }
    if blocks.is_empty() {
        return Err(PolarError::EmptyTable);
    }
    // Blocks must come in increasing Reynolds order when there are several.
    for w in blocks.windows(2) {
        if w[0].0 >= w[1].0 {
            return Err(PolarError::MalformedReynolds);
        }
    }
    Ok(blocks)
}

/* ----------------------------------- tests ---------------------------------- */
