use ndarray::Array2;

use crate::error::SeparationError;
use crate::Result;

pub const VOCALS_STEM: &str = "vocals";

/// Which output the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StemChoice {
    Vocals,
    Accompaniment,
}

impl StemChoice {
    /// Stable tag carried through the inline keyboard round trip.
    pub fn callback_data(self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Accompaniment => "accompaniment",
        }
    }

    pub fn from_callback_data(data: &str) -> Option<Self> {
        match data {
            "vocals" => Some(Self::Vocals),
            "accompaniment" => Some(Self::Accompaniment),
            _ => None,
        }
    }
}

impl std::fmt::Display for StemChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.callback_data())
    }
}

/// Picks the requested output from the model's stems. Stems are matched
/// by name, so the result is independent of the order the model emits
/// them. Accompaniment is the sum of every non-vocal stem.
pub fn select_stem(
    names: &[String],
    stems: Vec<Array2<f32>>,
    choice: StemChoice,
) -> Result<Array2<f32>> {
    match choice {
        StemChoice::Vocals => names
            .iter()
            .position(|n| n == VOCALS_STEM)
            .and_then(|i| stems.into_iter().nth(i))
            .ok_or_else(|| SeparationError::MissingStem(VOCALS_STEM.into())),
        StemChoice::Accompaniment => {
            let mut sum: Option<Array2<f32>> = None;
            for (name, stem) in names.iter().zip(stems) {
                if name == VOCALS_STEM {
                    continue;
                }
                match &mut sum {
                    Some(acc) => *acc += &stem,
                    None => sum = Some(stem),
                }
            }
            sum.ok_or_else(|| {
                SeparationError::Inference("model produced no non-vocal stems".into())
            })
        }
    }
}
