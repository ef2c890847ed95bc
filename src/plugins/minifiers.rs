use std::io::Write;

use log::debug;

use crate::core::error::Result;
use crate::core::traits::{InputSource, MinifierPlugin};

/// Writes the inputs back to back, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcatenatingMinifier;

impl MinifierPlugin for ConcatenatingMinifier {
    fn setting_names(&self) -> &[&'static str] {
        &["none", "combined"]
    }

    fn minify(&self, setting: &str, inputs: &[InputSource], out: &mut dyn Write) -> Result<()> {
        debug!("Concatenating {} inputs ({})", inputs.len(), setting);
        for input in inputs {
            out.write_all(input.content.as_bytes())?;
        }
        Ok(())
    }
}

/// Trims every line and drops the blank ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceMinifier;

impl MinifierPlugin for WhitespaceMinifier {
    fn setting_names(&self) -> &[&'static str] {
        &["whitespace"]
    }

    fn minify(&self, _setting: &str, inputs: &[InputSource], out: &mut dyn Write) -> Result<()> {
        for input in inputs {
            for line in input.content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                out.write_all(line.as_bytes())?;
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Vec<InputSource> {
        vec![
            InputSource::new("a.js", "  var a = 1;\n\n"),
            InputSource::new("b.js", "\tvar b = 2;  \n"),
        ]
    }

    #[test]
    fn test_concatenation_is_exact() {
        let mut out = Vec::new();
        ConcatenatingMinifier.minify("combined", &inputs(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  var a = 1;\n\n\tvar b = 2;  \n");
    }

    #[test]
    fn test_whitespace_minifier() {
        let mut out = Vec::new();
        WhitespaceMinifier.minify("whitespace", &inputs(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "var a = 1;\nvar b = 2;\n");
    }
}
