use clap::ValueEnum;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Algorithm {
    RoundRobin,
    LeastLoaded,
    WeightedOptimization,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "Round Robin",
            Algorithm::LeastLoaded => "Least Loaded",
            Algorithm::WeightedOptimization => "Weighted Optimization",
        }
    }

    /// The algorithm the interactive switch key cycles to.
    pub fn next(self) -> Algorithm {
        match self {
            Algorithm::RoundRobin => Algorithm::LeastLoaded,
            Algorithm::LeastLoaded => Algorithm::WeightedOptimization,
            Algorithm::WeightedOptimization => Algorithm::RoundRobin,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
