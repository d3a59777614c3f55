// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Tabular stimulus files.
//!
//! ```text
//! # a b rst
//! 0 1 1
//! 1,x,0
//! ```
//!
//! One row per step, one column per input, values `0 1 x z`. Lines starting
//! with `#` or `//` are comments. The first comment line names the columns
//! when it holds exactly one name per column; otherwise columns bind to the
//! model's input ports in declaration order.

use std::path::Path;

use rand::Rng;

use crate::logic::LogicValue;
use crate::signal::SignalArray;

use super::model::SignalMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StimulusError {
    #[error("cannot read stimulus: {0}")]
    Io(String),
    #[error("line {line}: bad value '{token}' (expected 0, 1, x or z)")]
    BadValue { line: usize, token: String },
    #[error("line {line}: {got} columns, expected {expected}")]
    Ragged { line: usize, got: usize, expected: usize },
    #[error("line {line}: {got} columns but the design has only {ports} inputs")]
    TooManyColumns { line: usize, got: usize, ports: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stimulus {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<LogicValue>>,
}

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
}

fn comment_body(line: &str) -> Option<&str> {
    line.strip_prefix("//").or_else(|| line.strip_prefix('#'))
}

impl Stimulus {
    /// Parse stimulus text. `inputs` supplies column names when the file has
    /// no usable header.
    pub fn parse<S: AsRef<str>>(src: &str, inputs: &[S]) -> Result<Stimulus, StimulusError> {
        let mut header: Option<Vec<String>> = None;
        let mut width = None;
        let mut stim = Stimulus::default();
        for (i, raw) in src.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(body) = comment_body(line) {
                if header.is_none() && width.is_none() {
                    header = Some(fields(body).map(str::to_string).collect());
                }
                continue;
            }
            let row = fields(line)
                .map(|tok| {
                    let mut chars = tok.chars();
                    match (chars.next().and_then(LogicValue::from_char), chars.next()) {
                        (Some(v), None) => Ok(v),
                        _ => Err(StimulusError::BadValue {
                            line: i + 1,
                            token: tok.to_string(),
                        }),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            match width {
                None => {
                    width = Some(row.len());
                    stim.columns = match header.take() {
                        Some(h) if h.len() == row.len() => h,
                        _ if row.len() <= inputs.len() => {
                            inputs[..row.len()].iter().map(|s| s.as_ref().to_string()).collect()
                        }
                        _ => {
                            return Err(StimulusError::TooManyColumns {
                                line: i + 1,
                                got: row.len(),
                                ports: inputs.len(),
                            })
                        }
                    };
                }
                Some(w) if w != row.len() => {
                    return Err(StimulusError::Ragged {
                        line: i + 1,
                        got: row.len(),
                        expected: w,
                    })
                }
                Some(_) => {}
            }
            stim.rows.push(row);
        }
        Ok(stim)
    }

    pub fn load<S: AsRef<str>>(path: impl AsRef<Path>, inputs: &[S]) -> Result<Stimulus, StimulusError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path)
            .map_err(|e| StimulusError::Io(format!("{}: {}", path.display(), e)))?;
        Stimulus::parse(&src, inputs)
    }

    /// `rows` steps of strong random 0/1 on every column.
    pub fn random<S: AsRef<str>, R: Rng + ?Sized>(columns: &[S], rows: usize, rng: &mut R) -> Stimulus {
        Stimulus {
            columns: columns.iter().map(|s| s.as_ref().to_string()).collect(),
            rows: (0..rows)
                .map(|_| (0..columns.len()).map(|_| LogicValue::from_bool(rng.gen())).collect())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One step input map per row, each value broadcast to all lanes.
    pub fn to_signal_maps(&self, lanes: usize) -> Vec<SignalMap> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(name, &v)| (name.clone(), SignalArray::filled(lanes, v)))
                    .collect()
            })
            .collect()
    }
}
