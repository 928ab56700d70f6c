//! Built-in possibilities for primitive types and basic collections.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use num_traits::PrimInt;

use crate::attempt::Attempt;
use crate::error::Stop;
use crate::possibility::{Boxed, Possibility};

/// Resolution of float draws
const FLOAT_STEPS: u64 = 1 << 53;

/// Integers in an inclusive range
///
/// Shrinks toward zero when the range contains it, otherwise toward the
/// bound closest to zero.
#[derive(Debug, Clone, Copy)]
pub struct Integers<T> {
    min: T,
    max: T,
}

/// Integers in `[min, max]`
pub fn integers<T: PrimInt + Debug>(min: T, max: T) -> Integers<T> {
    assert!(min <= max, "integers: min {:?} > max {:?}", min, max);
    Integers { min, max }
}

/// Integers across the full range of `T`
pub fn any_integer<T: PrimInt + Debug>() -> Integers<T> {
    integers(T::min_value(), T::max_value())
}

/// Map a choice to an integer so that small choices give values near zero
fn integer_from_choice(lo: i128, hi: i128, choice: u64) -> i128 {
    let c = i128::from(choice);
    if lo >= 0 {
        lo + c
    } else if hi <= 0 {
        hi - c
    } else {
        let (pos, neg) = (hi, -lo);
        let both = pos.min(neg);
        if c <= 2 * both {
            if c % 2 == 1 { (c + 1) / 2 } else { -(c / 2) }
        } else if pos > neg {
            c - both
        } else {
            -(c - both)
        }
    }
}

impl<T: PrimInt> Possibility for Integers<T> {
    type Value = T;

    fn produce(&self, tc: &mut Attempt) -> Result<T, Stop> {
        let (Some(lo), Some(hi)) = (self.min.to_i128(), self.max.to_i128()) else {
            return Err(tc.reject());
        };
        let span = u64::try_from(hi - lo).unwrap_or(u64::MAX);
        let choice = tc.choice(span)?;
        let value = integer_from_choice(lo, hi, choice);
        <T as num_traits::NumCast>::from(value).ok_or_else(|| tc.reject())
    }
}

/// Booleans; shrink to `false`
#[derive(Debug, Clone, Copy)]
pub struct Booleans;

pub fn booleans() -> Booleans {
    Booleans
}

impl Possibility for Booleans {
    type Value = bool;

    fn produce(&self, tc: &mut Attempt) -> Result<bool, Stop> {
        Ok(tc.choice(1)? == 1)
    }
}

/// Finite floats in an inclusive range; shrink toward `min`
#[derive(Debug, Clone, Copy)]
pub struct Floats {
    min: f64,
    max: f64,
}

/// Floats in `[min, max]`; both bounds must be finite
pub fn floats(min: f64, max: f64) -> Floats {
    assert!(
        min.is_finite() && max.is_finite() && min <= max,
        "floats: invalid range [{}, {}]",
        min,
        max
    );
    Floats { min, max }
}

impl Possibility for Floats {
    type Value = f64;

    fn produce(&self, tc: &mut Attempt) -> Result<f64, Stop> {
        let fraction = tc.choice(FLOAT_STEPS)? as f64 / FLOAT_STEPS as f64;
        let value = self.min * (1.0 - fraction) + self.max * fraction;
        Ok(value.clamp(self.min, self.max))
    }
}

/// Always the same value; draws nothing
#[derive(Debug, Clone)]
pub struct Just<T>(T);

pub fn just<T: Clone>(value: T) -> Just<T> {
    Just(value)
}

impl<T: Clone> Possibility for Just<T> {
    type Value = T;

    fn produce(&self, _tc: &mut Attempt) -> Result<T, Stop> {
        Ok(self.0.clone())
    }
}

/// One of a fixed list of values; shrinks toward the first
#[derive(Debug, Clone)]
pub struct SampledFrom<T> {
    values: Vec<T>,
}

pub fn sampled_from<T: Clone>(values: impl Into<Vec<T>>) -> SampledFrom<T> {
    let values = values.into();
    assert!(!values.is_empty(), "sampled_from requires at least one value");
    SampledFrom { values }
}

impl<T: Clone> Possibility for SampledFrom<T> {
    type Value = T;

    fn produce(&self, tc: &mut Attempt) -> Result<T, Stop> {
        let index = tc.choice(self.values.len() as u64 - 1)? as usize;
        Ok(self.values[index].clone())
    }
}

/// Values from one of several possibilities; shrinks toward the first
#[derive(Debug, Clone)]
pub struct OneOf<T> {
    options: Vec<Boxed<T>>,
}

pub fn one_of<T>(options: Vec<Boxed<T>>) -> OneOf<T> {
    assert!(!options.is_empty(), "one_of requires at least one possibility");
    OneOf { options }
}

impl<T> Possibility for OneOf<T> {
    type Value = T;

    fn produce(&self, tc: &mut Attempt) -> Result<T, Stop> {
        let index = tc.choice(self.options.len() as u64 - 1)? as usize;
        self.options[index].produce(tc)
    }
}

/// `None` or a value; shrinks to `None`
#[derive(Debug, Clone)]
pub struct Optional<P>(P);

pub fn optional<P: Possibility>(possibility: P) -> Optional<P> {
    Optional(possibility)
}

impl<P: Possibility> Possibility for Optional<P> {
    type Value = Option<P::Value>;

    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
        if tc.choice(1)? == 0 {
            Ok(None)
        } else {
            Ok(Some(self.0.produce(tc)?))
        }
    }
}

/// Shared length policy for collections
#[derive(Debug, Clone, Copy)]
struct Lengths {
    min: usize,
    max: usize,
    average: Option<f64>,
}

impl Lengths {
    fn new() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
            average: None,
        }
    }

    fn continue_probability(&self) -> f64 {
        let (min, max) = (self.min as f64, self.max as f64);
        let average = self
            .average
            .unwrap_or_else(|| (min * 2.0).max(min + 5.0).min((min + max) / 2.0));
        let extra = (average - min).max(0.0);
        extra / (extra + 1.0)
    }

    /// Decide whether to draw another element
    fn more(&self, tc: &mut Attempt, len: usize, p_continue: f64) -> Result<bool, Stop> {
        if len < self.min {
            Ok(tc.forced_choice(1)? == 1)
        } else if len >= self.max {
            tc.forced_choice(0)?;
            Ok(false)
        } else {
            tc.weighted(p_continue)
        }
    }
}

/// Vectors of values from an element possibility
///
/// Each element is preceded by a continue flag, and the flag plus the
/// element's choices form one labeled span. Deleting or reordering spans
/// deletes or reorders elements.
#[derive(Debug, Clone)]
pub struct Vectors<P> {
    element: P,
    lengths: Lengths,
}

pub fn vectors<P: Possibility>(element: P) -> Vectors<P> {
    Vectors {
        element,
        lengths: Lengths::new(),
    }
}

impl<P> Vectors<P> {
    pub fn min_len(mut self, n: usize) -> Self {
        self.lengths.min = n;
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        self.lengths.max = n;
        self
    }

    /// Expected length of generated vectors
    pub fn average_len(mut self, average: f64) -> Self {
        self.lengths.average = Some(average);
        self
    }
}

impl<P: Possibility> Possibility for Vectors<P> {
    type Value = Vec<P::Value>;

    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
        let p_continue = self.lengths.continue_probability();
        let mut result = Vec::new();
        loop {
            tc.start_span(std::any::type_name::<P>());
            if !self.lengths.more(tc, result.len(), p_continue)? {
                tc.discard_span();
                return Ok(result);
            }
            result.push(self.element.produce(tc)?);
            tc.stop_span();
        }
    }
}

/// Hash maps with keys and values from two possibilities; duplicate keys are dropped
#[derive(Debug, Clone)]
pub struct HashMaps<K, V> {
    keys: K,
    values: V,
    lengths: Lengths,
}

pub fn hash_maps<K, V>(keys: K, values: V) -> HashMaps<K, V>
where
    K: Possibility,
    K::Value: Eq + Hash,
    V: Possibility,
{
    HashMaps {
        keys,
        values,
        lengths: Lengths::new(),
    }
}

impl<K, V> HashMaps<K, V> {
    pub fn min_len(mut self, n: usize) -> Self {
        self.lengths.min = n;
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        self.lengths.max = n;
        self
    }
}

impl<K, V> Possibility for HashMaps<K, V>
where
    K: Possibility,
    K::Value: Eq + Hash,
    V: Possibility,
{
    type Value = HashMap<K::Value, V::Value>;

    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
        let p_continue = self.lengths.continue_probability();
        let give_up = self.lengths.min.saturating_mul(10).saturating_add(100);
        let mut result = HashMap::new();
        let mut draws = 0usize;
        loop {
            tc.start_span(std::any::type_name::<(K, V)>());
            if !self.lengths.more(tc, result.len(), p_continue)? {
                tc.discard_span();
                return Ok(result);
            }
            let key = self.keys.produce(tc)?;
            let value = self.values.produce(tc)?;
            tc.stop_span();
            result.entry(key).or_insert(value);

            draws += 1;
            if draws > give_up && result.len() < self.lengths.min {
                return Err(tc.reject());
            }
        }
    }
}

/// Characters from a set of inclusive ranges; shrink toward the first range's start
#[derive(Debug, Clone)]
pub struct Characters {
    ranges: Vec<(char, char)>,
}

impl Characters {
    /// Printable ASCII (space through tilde)
    pub fn ascii_printable() -> Self {
        Self::with_ranges(vec![(' ', '~')])
    }

    /// ASCII letters and digits, digits first
    pub fn ascii_alphanumeric() -> Self {
        Self::with_ranges(vec![('0', '9'), ('a', 'z'), ('A', 'Z')])
    }

    pub fn with_ranges(ranges: Vec<(char, char)>) -> Self {
        assert!(
            !ranges.is_empty() && ranges.iter().all(|(lo, hi)| lo <= hi),
            "characters require non-empty, ordered ranges"
        );
        Self { ranges }
    }

    fn total(&self) -> u64 {
        self.ranges
            .iter()
            .map(|(lo, hi)| u64::from(*hi as u32 - *lo as u32) + 1)
            .sum()
    }
}

/// Printable ASCII characters
pub fn characters() -> Characters {
    Characters::ascii_printable()
}

impl Possibility for Characters {
    type Value = char;

    fn produce(&self, tc: &mut Attempt) -> Result<char, Stop> {
        let mut index = tc.choice(self.total() - 1)?;
        for (lo, hi) in &self.ranges {
            let size = u64::from(*hi as u32 - *lo as u32) + 1;
            if index < size {
                // Ranges spanning the surrogate block have holes
                return char::from_u32(*lo as u32 + index as u32).ok_or_else(|| tc.reject());
            }
            index -= size;
        }
        Err(tc.reject())
    }
}

/// Strings built from a character possibility
#[derive(Debug, Clone)]
pub struct Text {
    chars: Vectors<Characters>,
}

/// Strings of printable ASCII
pub fn text() -> Text {
    text_from(characters())
}

/// Strings drawn from the given characters
pub fn text_from(chars: Characters) -> Text {
    Text {
        chars: vectors(chars),
    }
}

impl Text {
    pub fn min_len(mut self, n: usize) -> Self {
        self.chars = self.chars.min_len(n);
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        self.chars = self.chars.max_len(n);
        self
    }
}

impl Possibility for Text {
    type Value = String;

    fn produce(&self, tc: &mut Attempt) -> Result<String, Stop> {
        Ok(self.chars.produce(tc)?.into_iter().collect())
    }
}

/// Recursive structures: `extend` wraps the previous layer, up to `max_layers` deep
pub fn recursive<T, F>(base: Boxed<T>, extend: F, max_layers: usize) -> Boxed<T>
where
    T: 'static,
    F: Fn(Boxed<T>) -> Boxed<T>,
{
    let mut layer = base.clone();
    for _ in 0..max_layers {
        layer = one_of(vec![base.clone(), extend(layer)]).boxed();
    }
    layer
}

/// A possibility defined by a closure over the attempt
pub struct Composite<F, T> {
    build: F,
    _value: PhantomData<fn() -> T>,
}

/// Build values imperatively: `composite(|tc| Ok((integers(0, 9).produce(tc)?, ..)))`
pub fn composite<F, T>(build: F) -> Composite<F, T>
where
    F: Fn(&mut Attempt) -> Result<T, Stop>,
{
    Composite {
        build,
        _value: PhantomData,
    }
}

impl<F: Clone, T> Clone for Composite<F, T> {
    fn clone(&self) -> Self {
        Composite {
            build: self.build.clone(),
            _value: PhantomData,
        }
    }
}

impl<F, T> Possibility for Composite<F, T>
where
    F: Fn(&mut Attempt) -> Result<T, Stop>,
{
    type Value = T;

    fn produce(&self, tc: &mut Attempt) -> Result<T, Stop> {
        (self.build)(tc)
    }
}
