use std::fmt;

use crate::error::{LangReason, LangResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Detect {
    Inside,
    Outside,
    Enter,
    Exit,
    Cross,
}

impl Detect {
    pub fn parse(tok: &str) -> LangResult<Self> {
        match tok.to_ascii_lowercase().as_str() {
            "inside" => Ok(Self::Inside),
            "outside" => Ok(Self::Outside),
            "enter" => Ok(Self::Enter),
            "exit" => Ok(Self::Exit),
            "cross" => Ok(Self::Cross),
            other => Err(LangReason::ArgInvalid(other.to_string()).into()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Cross => "cross",
        }
    }
}

impl fmt::Display for Detect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subset of `{inside, outside, enter, exit, cross}`. Default (unspecified)
/// is all five.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectSet {
    kinds: Vec<Detect>,
}

impl DetectSet {
    pub fn all() -> Self {
        Self {
            kinds: vec![
                Detect::Inside,
                Detect::Outside,
                Detect::Enter,
                Detect::Exit,
                Detect::Cross,
            ],
        }
    }

    pub fn parse_csv(csv: &str) -> LangResult<Self> {
        let kinds = csv
            .split(',')
            .map(|s| Detect::parse(s.trim()))
            .collect::<LangResult<Vec<_>>>()?;
        Ok(Self { kinds })
    }

    pub fn contains(&self, d: Detect) -> bool {
        self.kinds.contains(&d)
    }

    pub fn covers_outside(&self) -> bool {
        self.contains(Detect::Outside)
    }

    pub fn iter(&self) -> impl Iterator<Item = Detect> + '_ {
        self.kinds.iter().copied()
    }
}

impl Default for DetectSet {
    fn default() -> Self {
        Self::all()
    }
}
