use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

/// A boolean selection mask
///
/// Selects the active subset of the sensitivity matrix columns (DOF) or rows (wavefront modes)
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionMask(Vec<bool>);

impl SelectionMask {
    /// Creates a new mask
    pub fn new(mask: Vec<bool>) -> Self {
        Self(mask)
    }
    /// Creates a mask that selects all the `n` entries
    pub fn all(n: usize) -> Self {
        Self(vec![true; n])
    }
    /// Returns the total number of mask entries
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Returns the number of selected entries
    pub fn nnz(&self) -> usize {
        self.0.iter().filter(|&&m| m).count()
    }
    /// Returns an iterator over the mask values
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }
    /// Returns the indices of the selected entries
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| if m { Some(i) } else { None })
    }
    pub fn as_slice(&self) -> &[bool] {
        self.0.as_slice()
    }
    /// Repeats the whole mask `n` times
    pub fn tile(&self, n: usize) -> Self {
        Self(
            std::iter::repeat(self.0.iter().copied())
                .take(n)
                .flatten()
                .collect(),
        )
    }
    /// Scatters the selected values back into a vector of the mask length, zero elsewhere
    pub fn unmask(&self, mut data: impl Iterator<Item = f64>) -> Vec<f64> {
        self.0
            .iter()
            .map(|&m| if m { data.next().unwrap_or_default() } else { 0. })
            .collect()
    }
}

impl From<Vec<bool>> for SelectionMask {
    fn from(value: Vec<bool>) -> Self {
        Self(value)
    }
}

impl FromStr for SelectionMask {
    type Err = char;
    /// Parses a digit run like `1101`, whitespace is ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                c => Err(c),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for SelectionMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0
            .iter()
            .try_for_each(|&m| write!(f, "{}", if m { '1' } else { '0' }))
    }
}

/// Selection of the items of an iterator by a mask
pub trait MaskFilter {
    /// Keeps the items at the selected mask entries, the iterator is cut at the mask length
    fn filter<'a, T: 'a + ?Sized>(
        self,
        data: impl Iterator<Item = &'a T>,
    ) -> impl Iterator<Item = &'a T>;
}
impl MaskFilter for &SelectionMask {
    fn filter<'a, T: 'a + ?Sized>(
        self,
        data: impl Iterator<Item = &'a T>,
    ) -> impl Iterator<Item = &'a T> {
        data.zip(self.iter())
            .filter(|(_, m)| *m)
            .map(|(data, _)| data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_digit_run() {
        let mask: SelectionMask = "1101 0".parse().unwrap();
        assert_eq!(mask.len(), 5);
        assert_eq!(mask.nnz(), 3);
        assert_eq!(mask.to_string(), "11010");
        assert_eq!("1102".parse::<SelectionMask>(), Err('2'));
    }

    #[test]
    fn tile_and_filter() {
        let mask: SelectionMask = "101".parse().unwrap();
        let tiled = mask.tile(2);
        assert_eq!(tiled.to_string(), "101101");
        let data: Vec<f64> = (0..6).map(|x| x as f64).collect();
        let selected: Vec<f64> = tiled.filter(data.iter()).copied().collect();
        assert_eq!(selected, vec![0., 2., 3., 5.]);
        assert_eq!(
            tiled.unmask(selected.into_iter()),
            vec![0., 0., 2., 3., 0., 5.]
        );
    }
}
