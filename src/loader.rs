//! # Listing Loader
//!
//! Loading turns a labeled listing into an executable [`Program`]. A first
//! pass maps every label to its code index (each instruction occupies one
//! slot, `label` markers included, so they stay no-ops at runtime). A second
//! pass rewrites every control-transfer instruction so its [`Location`]
//! carries the resolved index. A label that is referenced but never defined,
//! or defined twice, is a [`LoadError`].

use std::collections::HashMap;
use std::fmt;

use crate::bytecode::{Instr, Location};
use crate::error::LoadError;

/// A loaded program: a read-only code array with every location resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub code: Vec<Instr>,
}

impl Program {
    /// Number of code slots; `cp` values at or past this bound are faults.
    pub fn code_bound(&self) -> usize {
        self.code.len()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instr) in self.code.iter().enumerate() {
            writeln!(f, "{:>4}  {}", i, instr)?;
        }
        Ok(())
    }
}

/// Resolve labels and freeze the listing into a [`Program`].
pub fn load(listing: &[Instr]) -> Result<Program, LoadError> {
    let mut labels: HashMap<&str, usize> = HashMap::new();
    for (i, instr) in listing.iter().enumerate() {
        if let Instr::Label(label) = instr {
            if labels.insert(label.as_str(), i).is_some() {
                return Err(LoadError::DuplicateLabel(label.clone()));
            }
        }
    }

    let resolve = |loc: &Location| -> Result<Location, LoadError> {
        match labels.get(loc.label.as_str()) {
            Some(&i) => Ok(Location {
                label: loc.label.clone(),
                target: Some(i),
            }),
            None => Err(LoadError::UnresolvedLabel(loc.label.clone())),
        }
    };

    let mut code = Vec::with_capacity(listing.len());
    for instr in listing {
        code.push(match instr {
            Instr::Goto(loc) => Instr::Goto(resolve(loc)?),
            Instr::Test(loc) => Instr::Test(resolve(loc)?),
            Instr::Case(loc) => Instr::Case(resolve(loc)?),
            Instr::Try(loc) => Instr::Try(resolve(loc)?),
            Instr::MkClosure(loc, n) => Instr::MkClosure(resolve(loc)?, *n),
            other => other.clone(),
        });
    }
    Ok(Program { code })
}
