use std::collections::BTreeMap;
use std::marker::PhantomData;

/// A property value.
///
/// Values compare by content, lists element-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
	/// Boolean value.
	Bool(bool),
	/// Integer value.
	Int(i64),
	/// Text value.
	Text(String),
	/// List of values.
	List(Vec<PropertyValue>),
}

/// Rust types storable as property values.
pub trait PropertyType: Sized {
	/// Converts into a stored value.
	fn into_value(self) -> PropertyValue;
	/// Converts back from a stored value; `None` on a type mismatch.
	fn from_value(value: &PropertyValue) -> Option<Self>;
}

impl PropertyType for bool {
	fn into_value(self) -> PropertyValue {
		PropertyValue::Bool(self)
	}

	fn from_value(value: &PropertyValue) -> Option<Self> {
		match value {
			PropertyValue::Bool(b) => Some(*b),
			_ => None,
		}
	}
}

impl PropertyType for i64 {
	fn into_value(self) -> PropertyValue {
		PropertyValue::Int(self)
	}

	fn from_value(value: &PropertyValue) -> Option<Self> {
		match value {
			PropertyValue::Int(n) => Some(*n),
			_ => None,
		}
	}
}

impl PropertyType for String {
	fn into_value(self) -> PropertyValue {
		PropertyValue::Text(self)
	}

	fn from_value(value: &PropertyValue) -> Option<Self> {
		match value {
			PropertyValue::Text(s) => Some(s.clone()),
			_ => None,
		}
	}
}

impl<T: PropertyType> PropertyType for Vec<T> {
	fn into_value(self) -> PropertyValue {
		PropertyValue::List(self.into_iter().map(PropertyType::into_value).collect())
	}

	fn from_value(value: &PropertyValue) -> Option<Self> {
		match value {
			PropertyValue::List(items) => items.iter().map(T::from_value).collect(),
			_ => None,
		}
	}
}

/// A typed property key.
///
/// ```
/// use handly_model::{Properties, Property};
///
/// const PARAMETERS: Property<Vec<String>> = Property::new("parameters");
///
/// let mut props = Properties::default();
/// props.set(&PARAMETERS, vec!["a".to_string()]);
/// assert_eq!(props.get(&PARAMETERS), Some(vec!["a".to_string()]));
/// ```
pub struct Property<T> {
	name: &'static str,
	_marker: PhantomData<fn() -> T>,
}

impl<T> Property<T> {
	/// Creates a property key.
	pub const fn new(name: &'static str) -> Self {
		Self {
			name,
			_marker: PhantomData,
		}
	}

	/// Returns the key name.
	pub const fn name(&self) -> &'static str {
		self.name
	}
}

/// Named property values of a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(BTreeMap<&'static str, PropertyValue>);

impl Properties {
	/// Sets a property.
	pub fn set<T: PropertyType>(&mut self, property: &Property<T>, value: T) {
		self.0.insert(property.name, value.into_value());
	}

	/// Returns a property, or `None` if unset or of another type.
	pub fn get<T: PropertyType>(&self, property: &Property<T>) -> Option<T> {
		self.0.get(property.name).and_then(T::from_value)
	}

	/// Removes a property.
	pub fn remove<T>(&mut self, property: &Property<T>) {
		self.0.remove(property.name);
	}

	/// Returns the raw value stored under `name`.
	pub fn raw(&self, name: &str) -> Option<&PropertyValue> {
		self.0.get(name)
	}

	/// Returns true if no property is set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
