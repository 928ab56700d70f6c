//! The possibility protocol: composable descriptions of how to build values
//! from an attempt's choices.

use std::fmt::{self, Debug};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::attempt::Attempt;
use crate::error::Stop;

/// Choice cap used by [`Possibility::example`]
const EXAMPLE_MAX_CHOICES: usize = 10_000;

/// Retries a filter makes before rejecting the attempt
const FILTER_RETRIES: usize = 3;

/// A description of how to produce values of one type
///
/// Implementations must be deterministic functions of the choices they draw:
/// replaying the same sequence must produce the same value.
pub trait Possibility {
    /// The type of values this possibility produces
    type Value;

    /// Produce a value by drawing from `tc`
    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop>;

    /// Map produced values through `f`
    fn map<F, U>(self, f: F) -> Map<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Value) -> U,
    {
        Map {
            possibility: self,
            mapper: f,
        }
    }

    /// Keep only values satisfying `predicate`; rejects the attempt after a few misses
    fn filter<F>(self, predicate: F) -> Filter<Self, F>
    where
        Self: Sized,
        F: Fn(&Self::Value) -> bool,
    {
        Filter {
            possibility: self,
            predicate,
        }
    }

    /// Use a produced value to choose the next possibility
    fn bind<F, Q>(self, f: F) -> Bind<Self, F>
    where
        Self: Sized,
        F: Fn(Self::Value) -> Q,
        Q: Possibility,
    {
        Bind {
            possibility: self,
            binder: f,
        }
    }

    /// Erase the concrete type
    fn boxed(self) -> Boxed<Self::Value>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Boxed(Arc::new(self))
    }

    /// Produce one value outside of a run, or `None` if every try was rejected
    fn example(&self, seed: u64) -> Option<Self::Value> {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..100 {
            let mut tc = Attempt::fresh(rng.next_u64(), EXAMPLE_MAX_CHOICES);
            if let Ok(value) = self.produce(&mut tc) {
                return Some(value);
            }
        }
        None
    }
}

impl<P: Possibility + ?Sized> Possibility for &P {
    type Value = P::Value;

    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
        (**self).produce(tc)
    }
}

/// A possibility that maps values from one type to another
#[derive(Clone)]
pub struct Map<P, F> {
    possibility: P,
    mapper: F,
}

impl<P, F, U> Possibility for Map<P, F>
where
    P: Possibility,
    F: Fn(P::Value) -> U,
{
    type Value = U;

    fn produce(&self, tc: &mut Attempt) -> Result<U, Stop> {
        let value = self.possibility.produce(tc)?;
        Ok((self.mapper)(value))
    }
}

/// A possibility that filters values based on a predicate
#[derive(Clone)]
pub struct Filter<P, F> {
    possibility: P,
    predicate: F,
}

impl<P, F> Possibility for Filter<P, F>
where
    P: Possibility,
    F: Fn(&P::Value) -> bool,
{
    type Value = P::Value;

    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
        for _ in 0..FILTER_RETRIES {
            let value = self.possibility.produce(tc)?;
            if (self.predicate)(&value) {
                return Ok(value);
            }
        }
        Err(tc.reject())
    }
}

/// A possibility whose second stage depends on the first stage's value
#[derive(Clone)]
pub struct Bind<P, F> {
    possibility: P,
    binder: F,
}

impl<P, F, Q> Possibility for Bind<P, F>
where
    P: Possibility,
    F: Fn(P::Value) -> Q,
    Q: Possibility,
{
    type Value = Q::Value;

    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
        let value = self.possibility.produce(tc)?;
        (self.binder)(value).produce(tc)
    }
}

/// A type-erased, shareable possibility
pub struct Boxed<T>(Arc<dyn Possibility<Value = T> + Send + Sync>);

impl<T> Clone for Boxed<T> {
    fn clone(&self) -> Self {
        Boxed(Arc::clone(&self.0))
    }
}

impl<T> Debug for Boxed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boxed<{}>", std::any::type_name::<T>())
    }
}

impl<T> Possibility for Boxed<T> {
    type Value = T;

    fn produce(&self, tc: &mut Attempt) -> Result<T, Stop> {
        self.0.produce(tc)
    }
}

/// A possibility whose values are listed by name in failure reports
#[derive(Debug, Clone)]
pub struct Named<P> {
    name: String,
    possibility: P,
}

impl<P> Possibility for Named<P>
where
    P: Possibility,
    P::Value: Debug,
{
    type Value = P::Value;

    fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
        let value = self.possibility.produce(tc)?;
        tc.note_argument(&self.name, format!("{:?}", value));
        Ok(value)
    }
}

/// Attach an argument name to a possibility
pub fn named<P>(name: impl Into<String>, possibility: P) -> Named<P>
where
    P: Possibility,
    P::Value: Debug,
{
    Named {
        name: name.into(),
        possibility,
    }
}

macro_rules! tuple_possibility {
    ($($name:ident),+) => {
        impl<$($name: Possibility),+> Possibility for ($($name,)+) {
            type Value = ($($name::Value,)+);

            #[allow(non_snake_case)]
            fn produce(&self, tc: &mut Attempt) -> Result<Self::Value, Stop> {
                let ($($name,)+) = self;
                Ok(($($name.produce(tc)?,)+))
            }
        }
    };
}

tuple_possibility!(A);
tuple_possibility!(A, B);
tuple_possibility!(A, B, C);
tuple_possibility!(A, B, C, D);
tuple_possibility!(A, B, C, D, E);
tuple_possibility!(A, B, C, D, E, G);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{booleans, integers, just};

    #[test]
    fn test_map() {
        let doubled = integers(0u32, 10).map(|x| x * 2);
        let mut tc = Attempt::for_choices(&[4], 10);
        assert_eq!(doubled.produce(&mut tc), Ok(8));
    }

    #[test]
    fn test_filter_retries_then_rejects() {
        let even = integers(0u32, 10).filter(|x| x % 2 == 0);

        let mut tc = Attempt::for_choices(&[3, 5, 6], 10);
        assert_eq!(even.produce(&mut tc), Ok(6));

        let mut tc = Attempt::for_choices(&[1, 3, 5, 6], 10);
        assert_eq!(even.produce(&mut tc), Err(Stop::Rejected));
    }

    #[test]
    fn test_bind_uses_first_value() {
        let dependent = integers(1u64, 5).bind(|n| integers(0u64, n).map(move |m| (n, m)));
        let mut tc = Attempt::for_choices(&[2, 3], 10);
        let (n, m) = dependent.produce(&mut tc).unwrap();
        assert_eq!(n, 3);
        assert!(m <= n);
    }

    #[test]
    fn test_boxed_is_shareable() {
        let boxed = just(7).boxed();
        let copy = boxed.clone();
        let mut tc = Attempt::fresh(1, 10);
        assert_eq!(copy.produce(&mut tc), Ok(7));
        assert!(format!("{:?}", boxed).contains("i32"));
    }

    #[test]
    fn test_named_records_argument() {
        let arg = named("flag", booleans());
        let mut tc = Attempt::for_choices(&[1], 10);
        assert_eq!(arg.produce(&mut tc), Ok(true));
        assert_eq!(
            tc.notes().borrow().arguments,
            vec![("flag".to_string(), "true".to_string())]
        );
    }

    #[test]
    fn test_tuples_draw_in_order() {
        let pair = (integers(0u8, 9), integers(0u8, 9));
        let mut tc = Attempt::for_choices(&[1, 2], 10);
        assert_eq!(pair.produce(&mut tc), Ok((1, 2)));
    }

    #[test]
    fn test_example_outside_run() {
        let value = integers(10i64, 20).example(3).unwrap();
        assert!((10..=20).contains(&value));
        assert!(just(1).filter(|_| false).example(3).is_none());
    }
}
