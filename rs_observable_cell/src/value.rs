use std::fmt::Debug;

/// Values a cell can hold.
///
/// Besides equality (used to drop redundant updates) a value has to answer
/// two questions at delivery time: is there something to deliver at all, and
/// can it be spread into several elements when the cell unpacks.
pub trait CellValue: Clone + PartialEq + Debug {
    /// Type of a single element when the value is spread
    type Element: Clone + PartialEq + Debug;

    /// Loose notion of "holds something": zero, `false`, empty strings,
    /// `NaN` and `None` are not truthy.
    fn is_truthy(&self) -> bool;

    /// Strict notion of "holds something": only `None` and `()` are absent.
    fn is_present(&self) -> bool {
        true
    }

    /// Elements of a composite value, `None` for scalar values
    fn elements(&self) -> Option<Vec<Self::Element>> {
        None
    }
}

/// Decides which stored values are delivered and which are reported as
/// absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Deliver only truthy values
    #[default]
    Truthy,
    /// Deliver everything except `None` / `()`
    Strict,
}

impl Presence {
    pub fn admits<T: CellValue>(self, value: &T) -> bool {
        match self {
            Presence::Truthy => value.is_truthy(),
            Presence::Strict => value.is_present(),
        }
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T: CellValue> {
    /// The stored value as a whole
    Value(T),
    /// The elements of a composite value, delivered by an unpacking cell
    Spread(Vec<T::Element>),
}

impl<T: CellValue> Delivery<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Delivery::Value(v) => Some(v),
            Delivery::Spread(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Delivery::Value(v) => Some(v),
            Delivery::Spread(_) => None,
        }
    }

    pub fn elements(&self) -> Option<&[T::Element]> {
        match self {
            Delivery::Value(_) => None,
            Delivery::Spread(e) => Some(e),
        }
    }

    pub fn is_spread(&self) -> bool {
        matches!(self, Delivery::Spread(_))
    }
}

macro_rules! int_values {
    ($($t:ty),*) => {
        $(
            impl CellValue for $t {
                type Element = $t;

                fn is_truthy(&self) -> bool {
                    *self != 0
                }
            }
        )*
    };
}

int_values!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! float_values {
    ($($t:ty),*) => {
        $(
            impl CellValue for $t {
                type Element = $t;

                fn is_truthy(&self) -> bool {
                    *self != 0.0 && !self.is_nan()
                }
            }
        )*
    };
}

float_values!(f32, f64);

impl CellValue for bool {
    type Element = bool;

    fn is_truthy(&self) -> bool {
        *self
    }
}

impl CellValue for char {
    type Element = char;

    fn is_truthy(&self) -> bool {
        true
    }
}

impl CellValue for String {
    type Element = String;

    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl CellValue for &'static str {
    type Element = &'static str;

    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl CellValue for () {
    type Element = ();

    fn is_truthy(&self) -> bool {
        false
    }

    fn is_present(&self) -> bool {
        false
    }
}

impl<V: CellValue> CellValue for Option<V> {
    type Element = V::Element;

    fn is_truthy(&self) -> bool {
        self.as_ref().map_or(false, CellValue::is_truthy)
    }

    fn is_present(&self) -> bool {
        self.as_ref().map_or(false, CellValue::is_present)
    }

    fn elements(&self) -> Option<Vec<Self::Element>> {
        self.as_ref().and_then(CellValue::elements)
    }
}

// Sequences are always truthy, even when empty.
impl<E: Clone + PartialEq + Debug> CellValue for Vec<E> {
    type Element = E;

    fn is_truthy(&self) -> bool {
        true
    }

    fn elements(&self) -> Option<Vec<E>> {
        Some(self.clone())
    }
}

impl<E: Clone + PartialEq + Debug, const N: usize> CellValue for [E; N] {
    type Element = E;

    fn is_truthy(&self) -> bool {
        true
    }

    fn elements(&self) -> Option<Vec<E>> {
        Some(self.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_of_scalars() {
        assert!(!0i32.is_truthy());
        assert!(5i32.is_truthy());
        assert!(!false.is_truthy());
        assert!(!f64::NAN.is_truthy());
        assert!(!String::new().is_truthy());
        assert!("x".is_truthy());
        assert!(!().is_truthy());
        assert!(Vec::<u8>::new().is_truthy());
    }

    #[test]
    fn presence_policies() {
        assert!(!Presence::Truthy.admits(&0u8));
        assert!(Presence::Strict.admits(&0u8));
        assert!(Presence::Strict.admits(&""));
        assert!(!Presence::Strict.admits(&None::<i32>));
        assert!(!Presence::Truthy.admits(&Some(0)));
        assert!(Presence::Strict.admits(&Some(0)));
    }

    #[test]
    fn composite_elements() {
        assert_eq!(vec![1, 2, 3].elements(), Some(vec![1, 2, 3]));
        assert_eq!(["a", "b"].elements(), Some(vec!["a", "b"]));
        assert_eq!(Some(vec![7]).elements(), Some(vec![7]));
        assert_eq!(None::<Vec<i32>>.elements(), None);
        assert_eq!(42u64.elements(), None);
    }

    #[test]
    fn delivery_accessors() {
        let d: Delivery<Vec<i32>> = Delivery::Spread(vec![3, 4]);
        assert!(d.is_spread());
        assert_eq!(d.elements(), Some(&[3, 4][..]));
        assert_eq!(d.value(), None);

        let d: Delivery<i32> = Delivery::Value(5);
        assert_eq!(d.clone().into_value(), Some(5));
        assert!(d.elements().is_none());
    }
}
