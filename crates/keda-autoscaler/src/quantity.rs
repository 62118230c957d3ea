//! Canonical Kubernetes quantity strings for integer amounts.
//!
//! Kubernetes serializes quantities in a canonical form: the value is scaled by the biggest suffix
//! which divides it without a remainder. `209715200` bytes for example become `200Mi` in the
//! binary-SI format and `20000` becomes `20k` in the decimal-SI format.
//!
//! ### See
//!
//! - <https://github.com/kubernetes/apimachinery/blob/master/pkg/api/resource/quantity.go>

use std::fmt::Display;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Byte-multiples based on powers of 2, as accepted by Kubernetes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum BinaryMultiple {
    #[strum(serialize = "Ki")]
    Kibi,

    #[strum(serialize = "Mi")]
    Mebi,

    #[strum(serialize = "Gi")]
    Gibi,

    #[strum(serialize = "Ti")]
    Tebi,

    #[strum(serialize = "Pi")]
    Pebi,

    #[strum(serialize = "Ei")]
    Exbi,
}

impl BinaryMultiple {
    const BASE: i64 = 1024;

    pub fn scale_up(self) -> Option<Self> {
        match self {
            Self::Kibi => Some(Self::Mebi),
            Self::Mebi => Some(Self::Gibi),
            Self::Gibi => Some(Self::Tebi),
            Self::Tebi => Some(Self::Pebi),
            Self::Pebi => Some(Self::Exbi),
            Self::Exbi => None,
        }
    }
}

/// Multiples based on powers of 10 (`k` is lowercase, the rest are uppercase).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum DecimalMultiple {
    #[strum(serialize = "k")]
    Kilo,

    #[strum(serialize = "M")]
    Mega,

    #[strum(serialize = "G")]
    Giga,

    #[strum(serialize = "T")]
    Tera,

    #[strum(serialize = "P")]
    Peta,

    #[strum(serialize = "E")]
    Exa,
}

impl DecimalMultiple {
    const BASE: i64 = 1000;

    pub fn scale_up(self) -> Option<Self> {
        match self {
            Self::Kilo => Some(Self::Mega),
            Self::Mega => Some(Self::Giga),
            Self::Giga => Some(Self::Tera),
            Self::Tera => Some(Self::Peta),
            Self::Peta => Some(Self::Exa),
            Self::Exa => None,
        }
    }
}

/// Scales `value` by `base` as long as it divides without a remainder, walking up the suffixes
/// starting at `first`.
fn canonicalize<S>(value: i64, base: i64, first: S, scale_up: fn(S) -> Option<S>) -> String
where
    S: Copy + Display,
{
    if value == 0 || value % base != 0 {
        return value.to_string();
    }

    let mut value = value / base;
    let mut suffix = first;

    while value % base == 0 {
        match scale_up(suffix) {
            Some(next) => {
                value /= base;
                suffix = next;
            }
            None => break,
        }
    }

    format!("{value}{suffix}")
}

/// Formats `bytes` as a canonical binary-SI quantity, e.g. `200Mi` or `1536Mi`.
///
/// Amounts smaller than `1Ki` (in magnitude) are written without a suffix.
pub fn binary_si(bytes: i64) -> String {
    canonicalize(
        bytes,
        BinaryMultiple::BASE,
        BinaryMultiple::Kibi,
        BinaryMultiple::scale_up,
    )
}

/// Formats `value` as a canonical decimal-SI quantity, e.g. `5`, `1500` or `20k`.
pub fn decimal_si(value: i64) -> String {
    canonicalize(
        value,
        DecimalMultiple::BASE,
        DecimalMultiple::Kilo,
        DecimalMultiple::scale_up,
    )
}

/// Converts mebibytes to a canonical binary-SI [`Quantity`].
pub fn mebibytes(mebibytes: i64) -> Quantity {
    Quantity(binary_si(mebibytes.saturating_mul(1024 * 1024)))
}
