//! OAuth 2.1 + PKCE against a generic provider: the authorization,
//! token, and optional registration endpoints all come from the server's
//! own config (`hotaru_config::OAuthEndpoints`), never from a hardcoded issuer.

use std::time::Duration;

use hotaru_config::OAuthEndpoints;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};
use crate::pkce::PkceCodes;

pub struct ExchangedTokens {
	pub access_token: String,
	pub refresh_token: Option<String>,
}

pub fn build_authorize_url(endpoints: &OAuthEndpoints, redirect_uri: &str, pkce: &PkceCodes, state: &str) -> McpResult<String> {
	let client_id = endpoints.client_id.as_deref().unwrap_or("hotaru");
	let scope = endpoints.scopes.join(" ");

	let params = [
		("response_type", "code"),
		("client_id", client_id),
		("redirect_uri", redirect_uri),
		("scope", &scope),
		("code_challenge", &pkce.challenge),
		("code_challenge_method", "S256"),
		("state", state),
	];

	let query = params.iter().map(|(k, v)| format!("{k}={}", urlencoding::encode(v))).collect::<Vec<_>>().join("&");

	let separator = if endpoints.authorization_endpoint.contains('?') { '&' } else { '?' };
	Ok(format!("{}{separator}{query}", endpoints.authorization_endpoint))
}

/// Dynamic client registration (RFC 7591), used when the provider exposes a
/// `registration_endpoint` and no static `client_id` was configured.
pub async fn register_client(endpoints: &OAuthEndpoints, redirect_uri: &str) -> McpResult<String> {
	let Some(registration_endpoint) = &endpoints.registration_endpoint else {
		return Err(McpError::ClientRegistration("server has no registration_endpoint configured".to_string()));
	};

	#[derive(Serialize)]
	struct RegisterRequest<'a> {
		redirect_uris: [&'a str; 1],
		token_endpoint_auth_method: &'static str,
		grant_types: [&'static str; 1],
		response_types: [&'static str; 1],
	}

	#[derive(Deserialize)]
	struct RegisterResponse {
		client_id: String,
	}

	let client = Client::new();
	let response = client
		.post(registration_endpoint.as_str())
		.json(&RegisterRequest {
			redirect_uris: [redirect_uri],
			token_endpoint_auth_method: "none",
			grant_types: ["authorization_code"],
			response_types: ["code"],
		})
		.timeout(Duration::from_secs(30))
		.send()
		.await?;

	if !response.status().is_success() {
		let status = response.status();
		let text = response.text().await.unwrap_or_default();
		return Err(McpError::ClientRegistration(format!("status {status}: {text}")));
	}

	let registered: RegisterResponse = response.json().await.map_err(|e| McpError::ClientRegistration(format!("invalid response: {e}")))?;
	Ok(registered.client_id)
}

pub async fn exchange_code_for_tokens(endpoints: &OAuthEndpoints, client_id: &str, redirect_uri: &str, pkce: &PkceCodes, code: &str) -> McpResult<ExchangedTokens> {
	#[derive(Deserialize)]
	struct TokenResponse {
		access_token: String,
		refresh_token: Option<String>,
	}

	let client = Client::new();
	let mut form = vec![
		("grant_type", "authorization_code"),
		("code", code),
		("redirect_uri", redirect_uri),
		("client_id", client_id),
		("code_verifier", pkce.verifier.as_str()),
	];
	if let Some(secret) = &endpoints.client_secret {
		form.push(("client_secret", secret.as_str()));
	}

	let response = client.post(endpoints.token_endpoint.as_str()).form(&form).timeout(Duration::from_secs(30)).send().await?;

	if !response.status().is_success() {
		let status = response.status();
		let text = response.text().await.unwrap_or_default();
		return Err(McpError::TokenExchange(format!("status {status}: {text}")));
	}

	let tokens: TokenResponse = response.json().await.map_err(|e| McpError::TokenExchange(format!("invalid response: {e}")))?;
	Ok(ExchangedTokens { access_token: tokens.access_token, refresh_token: tokens.refresh_token })
}

#[cfg(test)]
mod tests {
	use super::*;

	fn endpoints() -> OAuthEndpoints {
		OAuthEndpoints {
			authorization_endpoint: "https://auth.example/authorize".to_string(),
			token_endpoint: "https://auth.example/token".to_string(),
			registration_endpoint: None,
			client_id: Some("abc123".to_string()),
			client_secret: None,
			scopes: vec!["tools".to_string(), "resources".to_string()],
		}
	}

	#[test]
	fn authorize_url_carries_pkce_and_state() {
		let pkce = PkceCodes::generate();
		let url = build_authorize_url(&endpoints(), "http://127.0.0.1:19876/mcp/oauth/callback", &pkce, "state123").unwrap();
		assert!(url.starts_with("https://auth.example/authorize?"));
		assert!(url.contains("code_challenge_method=S256"));
		assert!(url.contains("state=state123"));
		assert!(url.contains(&urlencoding::encode(&pkce.challenge).into_owned()));
	}

	#[tokio::test]
	async fn registration_without_endpoint_is_an_error() {
		let result = register_client(&endpoints(), "http://127.0.0.1:19876/mcp/oauth/callback").await;
		assert!(matches!(result, Err(McpError::ClientRegistration(_))));
	}
}
