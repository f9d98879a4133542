//! JSONC preprocessing: `{env:VAR}` substitution, then comment/trailing-comma
//! stripping, in that order, matching `core/config_loader.py`'s substitution-
//! before-parse pass.

use crate::error::ConfigError;

/// Replaces every `{env:VAR}` occurrence with the value of the environment
/// variable `VAR`. Fails if `VAR` is not set.
pub fn substitute_env(input: &str, path_hint: &str) -> Result<String, ConfigError> {
	let mut out = String::with_capacity(input.len());
	let mut rest = input;
	while let Some(start) = rest.find("{env:") {
		out.push_str(&rest[..start]);
		let after = &rest[start + "{env:".len()..];
		let Some(end) = after.find('}') else {
			out.push_str(&rest[start..]);
			rest = "";
			break;
		};
		let var = &after[..end];
		let value = std::env::var(var).map_err(|_| ConfigError::MissingEnvVar(path_hint.to_string(), var.to_string()))?;
		out.push_str(&value);
		rest = &after[end + 1..];
	}
	out.push_str(rest);
	Ok(out)
}

/// Strips `//` line comments, `/* */` block comments, and trailing commas
/// before array/object close brackets, leaving plain JSON for `serde_json`.
/// Comment markers inside string literals are left untouched.
#[must_use]
pub fn strip_jsonc(input: &str) -> String {
	let bytes = input.as_bytes();
	let mut out = String::with_capacity(input.len());
	let mut i = 0;
	let mut in_string = false;
	let mut escaped = false;

	while i < bytes.len() {
		let c = bytes[i] as char;

		if in_string {
			out.push(c);
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_string = false;
			}
			i += 1;
			continue;
		}

		match c {
			'"' => {
				in_string = true;
				out.push(c);
				i += 1;
			}
			'/' if bytes.get(i + 1) == Some(&b'/') => {
				while i < bytes.len() && bytes[i] != b'\n' {
					i += 1;
				}
			}
			'/' if bytes.get(i + 1) == Some(&b'*') => {
				i += 2;
				while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
					i += 1;
				}
				i += 2;
			}
			_ => {
				out.push(c);
				i += 1;
			}
		}
	}

	strip_trailing_commas(&out)
}

fn strip_trailing_commas(input: &str) -> String {
	let bytes = input.as_bytes();
	let mut out = String::with_capacity(input.len());
	let mut in_string = false;
	let mut escaped = false;
	let mut i = 0;

	while i < bytes.len() {
		let c = bytes[i] as char;
		if in_string {
			out.push(c);
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_string = false;
			}
			i += 1;
			continue;
		}
		if c == '"' {
			in_string = true;
			out.push(c);
			i += 1;
			continue;
		}
		if c == ',' {
			let mut j = i + 1;
			while j < bytes.len() && (bytes[j] as char).is_whitespace() {
				j += 1;
			}
			if j < bytes.len() && (bytes[j] == b'}' || bytes[j] == b']') {
				i += 1;
				continue;
			}
		}
		out.push(c);
		i += 1;
	}
	out
}
