//! Hierarchical storage keys.

use std::fmt;
use std::path::PathBuf;

/// A hierarchical, ordered key tuple, e.g. `["session", "abc"]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<String>);

impl Key {
	/// Builds a key from path segments.
	pub fn new<I, S>(segments: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self(segments.into_iter().map(Into::into).collect())
	}

	/// The key's segments.
	#[must_use]
	pub fn segments(&self) -> &[String] {
		&self.0
	}

	/// Whether `self` starts with every segment of `prefix`, in order.
	#[must_use]
	pub fn starts_with(&self, prefix: &Key) -> bool {
		self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
	}

	/// The namespace this key belongs to: its first segment, or the empty
	/// string for a zero-length key.
	#[must_use]
	pub fn namespace(&self) -> &str {
		self.0.first().map(String::as_str).unwrap_or_default()
	}

	/// Whether this key belongs to a namespace that requires directory
	/// fsync on write (sessions, messages, parts).
	#[must_use]
	pub fn is_durable(&self) -> bool {
		matches!(self.namespace(), "session" | "message" | "part")
	}

	/// Relative filesystem path for this key under a storage root, with a
	/// `.json` extension on the final segment.
	#[must_use]
	pub fn to_relative_path(&self) -> PathBuf {
		let mut path = PathBuf::new();
		for (i, seg) in self.0.iter().enumerate() {
			if i + 1 == self.0.len() {
				path.push(format!("{seg}.json"));
			} else {
				path.push(seg);
			}
		}
		path
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.join("/"))
	}
}

impl<S: Into<String>> From<Vec<S>> for Key {
	fn from(segments: Vec<S>) -> Self {
		Self::new(segments)
	}
}

impl From<&[&str]> for Key {
	fn from(segments: &[&str]) -> Self {
		Self::new(segments.iter().copied())
	}
}
