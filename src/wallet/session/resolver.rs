//! Two-factor and hardware challenge resolution.
//!
//! An engine call object may stop mid-flight and ask for a method choice, a code, or a hardware
//! signature. [`ResolverManager`] drives the call object's status loop until it reports `done`
//! or `error`, suspending on the [`TwoFactorPrompt`] or [`HwResolver`] whenever user input is
//! needed. Cancellation from either collaborator propagates as [`TwoFactorError::Cancel`] and is
//! never counted as a wrong code.

use crate::engine::{RequiredData, TwoFactorCall, TwoFactorStatus, run_blocking};
use crate::wallet::credentials::redact;
use crate::wallet::network::NetworkSecurityCase;
use crate::wallet::session::config::ResolverConfig;
use crate::wallet::types::{TwoFactorError, WalletError};

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts shown to the user when the engine does not say.
pub const DEFAULT_ATTEMPTS_REMAINING: u32 = 3;

/// What the user is asked for when a code is needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRequest {
    pub method: String,
    pub attempts_remaining: u32,
    /// Only SMS is enabled; the UI may offer a phone call instead.
    pub enable_2fa_call_method: bool,
    pub network: NetworkSecurityCase,
}

/// User-facing side of a two-factor flow.
#[async_trait::async_trait]
pub trait TwoFactorPrompt: Send + Sync {
    /// Pick one of `methods`.
    async fn method(&self, methods: &[String]) -> Result<String, TwoFactorError>;

    /// Ask for the code sent through `request.method`.
    async fn code(&self, request: &CodeRequest) -> Result<String, TwoFactorError>;
}

/// Hardware wallet side of a flow. Returns the device reply passed back to the engine.
#[async_trait::async_trait]
pub trait HwResolver: Send + Sync {
    async fn resolve(&self, required_data: &RequiredData) -> Result<Value, TwoFactorError>;
}

/// Reports whether the owning session currently has a connection.
pub type ConnectionProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Everything a session needs to resolve its call objects.
#[derive(Clone)]
pub struct ResolverContext {
    pub network: NetworkSecurityCase,
    pub config: ResolverConfig,
    pub prompt: Option<Arc<dyn TwoFactorPrompt>>,
    pub hw: Option<Arc<dyn HwResolver>>,
    pub connected: ConnectionProbe,
}

impl ResolverContext {
    pub fn new(network: NetworkSecurityCase, config: ResolverConfig) -> Self {
        Self {
            network,
            config,
            prompt: None,
            hw: None,
            connected: Arc::new(|| true),
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn TwoFactorPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_hw(mut self, hw: Arc<dyn HwResolver>) -> Self {
        self.hw = Some(hw);
        self
    }

    pub fn with_connection_probe(mut self, connected: ConnectionProbe) -> Self {
        self.connected = connected;
        self
    }
}

/// Drives one call object to completion.
pub struct ResolverManager {
    call: Arc<dyn TwoFactorCall>,
    context: ResolverContext,
    selected_method: Option<String>,
    code_submitted: bool,
    wrong_codes: u32,
}

impl ResolverManager {
    pub fn new(call: Arc<dyn TwoFactorCall>, context: ResolverContext) -> Self {
        Self {
            call,
            context,
            selected_method: None,
            code_submitted: false,
            wrong_codes: 0,
        }
    }

    /// Wrong codes entered so far in this flow.
    pub fn wrong_codes(&self) -> u32 {
        self.wrong_codes
    }

    /// Run the status loop. Returns the call's `result`, if any.
    pub async fn run(&mut self) -> Result<Option<Value>, WalletError> {
        loop {
            let call = self.call.clone();
            let raw = run_blocking(move || call.get_status()).await?;
            debug!("resolver {} status {}", self.context.network, redact(&raw));
            let status: TwoFactorStatus = serde_json::from_value(raw)?;

            match status {
                TwoFactorStatus::Done { result } => return Ok(result),
                TwoFactorStatus::Error { error } => {
                    warn!("resolver {} failed: {}", self.context.network, error);
                    return Err(TwoFactorError::Failure(error).into());
                }
                TwoFactorStatus::Call => {
                    self.wait_connection().await?;
                    let call = self.call.clone();
                    run_blocking(move || call.call()).await?;
                }
                TwoFactorStatus::RequestCode { methods } => {
                    let method = self.choose_method(&methods).await?;
                    info!("resolver {} requesting code via {}", self.context.network, method);
                    let call = self.call.clone();
                    let requested = method.clone();
                    run_blocking(move || call.request_code(&requested)).await?;
                    self.selected_method = Some(method);
                }
                TwoFactorStatus::ResolveCode {
                    required_data: Some(data),
                    ..
                } => {
                    let hw = self.context.hw.clone().ok_or_else(|| {
                        TwoFactorError::Failure(format!("no hardware resolver for {}", data.action))
                    })?;
                    let reply = hw.resolve(&data).await?.to_string();
                    let call = self.call.clone();
                    run_blocking(move || call.resolve_code(&reply)).await?;
                }
                TwoFactorStatus::ResolveCode {
                    method,
                    methods,
                    attempts_remaining,
                    required_data: None,
                } => {
                    if self.code_submitted {
                        self.wrong_codes += 1;
                        warn!(
                            "resolver {} wrong code ({}/{})",
                            self.context.network, self.wrong_codes, self.context.config.max_code_attempts
                        );
                    }
                    if self.wrong_codes >= self.context.config.max_code_attempts
                        || attempts_remaining == Some(0)
                    {
                        return Err(TwoFactorError::AttemptsExhausted.into());
                    }
                    let request = CodeRequest {
                        method: method
                            .or_else(|| self.selected_method.clone())
                            .unwrap_or_else(|| "gauth".to_string()),
                        attempts_remaining: attempts_remaining.unwrap_or(DEFAULT_ATTEMPTS_REMAINING),
                        enable_2fa_call_method: methods == ["sms"],
                        network: self.context.network,
                    };
                    let code = self.prompt()?.code(&request).await?;
                    let call = self.call.clone();
                    run_blocking(move || call.resolve_code(&code)).await?;
                    self.code_submitted = true;
                }
            }
        }
    }

    async fn choose_method(&self, methods: &[String]) -> Result<String, WalletError> {
        match methods {
            [] => Err(TwoFactorError::Failure("id_no_two_factor_methods".into()).into()),
            [only] => Ok(only.clone()),
            many => Ok(self.prompt()?.method(many).await?),
        }
    }

    fn prompt(&self) -> Result<Arc<dyn TwoFactorPrompt>, TwoFactorError> {
        self.context
            .prompt
            .clone()
            .ok_or_else(|| TwoFactorError::Failure("no two-factor prompt available".into()))
    }

    async fn wait_connection(&self) -> Result<(), TwoFactorError> {
        for attempt in 0..self.context.config.connection_attempts {
            if (self.context.connected)() {
                return Ok(());
            }
            debug!("resolver {} waiting for connection ({})", self.context.network, attempt + 1);
            tokio::time::sleep(self.context.config.connection_wait()).await;
        }
        if (self.context.connected)() {
            return Ok(());
        }
        Err(TwoFactorError::ConnectionTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Call object replaying a fixed list of statuses and recording what it was sent.
    struct ScriptedCall {
        statuses: Mutex<VecDeque<Value>>,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedCall {
        fn new(statuses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                statuses: Mutex::new(statuses.into()),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl TwoFactorCall for ScriptedCall {
        fn get_status(&self) -> Result<Value, EngineError> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| EngineError::Generic("script exhausted".into()))
        }

        fn call(&self) -> Result<(), EngineError> {
            self.sent.lock().unwrap().push("call".into());
            Ok(())
        }

        fn request_code(&self, method: &str) -> Result<(), EngineError> {
            self.sent.lock().unwrap().push(format!("request:{}", method));
            Ok(())
        }

        fn resolve_code(&self, code: &str) -> Result<(), EngineError> {
            self.sent.lock().unwrap().push(format!("code:{}", code));
            Ok(())
        }
    }

    struct Prompt {
        codes: Mutex<VecDeque<Result<String, TwoFactorError>>>,
        requests: Mutex<Vec<CodeRequest>>,
    }

    impl Prompt {
        fn new(codes: Vec<Result<String, TwoFactorError>>) -> Arc<Self> {
            Arc::new(Self {
                codes: Mutex::new(codes.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl TwoFactorPrompt for Prompt {
        async fn method(&self, methods: &[String]) -> Result<String, TwoFactorError> {
            Ok(methods[1].clone())
        }

        async fn code(&self, request: &CodeRequest) -> Result<String, TwoFactorError> {
            self.requests.lock().unwrap().push(request.clone());
            self.codes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TwoFactorError::Cancel("no more codes".into())))
        }
    }

    fn context(prompt: Arc<Prompt>) -> ResolverContext {
        ResolverContext::new(NetworkSecurityCase::BitcoinMS, ResolverConfig::default())
            .with_prompt(prompt)
    }

    #[tokio::test]
    async fn resolves_method_then_code() {
        let call = ScriptedCall::new(vec![
            json!({ "status": "request_code", "methods": ["email", "sms"] }),
            json!({ "status": "resolve_code", "method": "sms", "methods": ["sms"] }),
            json!({ "status": "call" }),
            json!({ "status": "done", "result": { "txhash": "ff" } }),
        ]);
        let prompt = Prompt::new(vec![Ok("123456".into())]);
        let mut resolver = ResolverManager::new(call.clone(), context(prompt.clone()));

        let result = resolver.run().await.unwrap();
        assert_eq!(result, Some(json!({ "txhash": "ff" })));
        assert_eq!(
            *call.sent.lock().unwrap(),
            vec!["request:sms", "code:123456", "call"]
        );
        let requests = prompt.requests.lock().unwrap();
        assert_eq!(requests[0].attempts_remaining, DEFAULT_ATTEMPTS_REMAINING);
        assert!(requests[0].enable_2fa_call_method);
    }

    #[tokio::test]
    async fn cancel_is_not_a_wrong_code() {
        let call = ScriptedCall::new(vec![
            json!({ "status": "resolve_code", "method": "gauth" }),
        ]);
        let prompt = Prompt::new(vec![Err(TwoFactorError::Cancel("id_action_canceled".into()))]);
        let mut resolver = ResolverManager::new(call, context(prompt));

        let err = resolver.run().await.unwrap_err();
        assert!(err.is_cancel());
        assert_eq!(resolver.wrong_codes(), 0);
    }

    #[tokio::test]
    async fn wrong_codes_exhaust_after_limit() {
        let call = ScriptedCall::new(vec![
            json!({ "status": "resolve_code", "method": "gauth", "attempts_remaining": 3 }),
            json!({ "status": "resolve_code", "method": "gauth", "attempts_remaining": 2 }),
            json!({ "status": "resolve_code", "method": "gauth", "attempts_remaining": 1 }),
            json!({ "status": "resolve_code", "method": "gauth", "attempts_remaining": 1 }),
        ]);
        let prompt = Prompt::new(vec![
            Ok("000000".into()),
            Ok("111111".into()),
            Ok("222222".into()),
        ]);
        let mut resolver = ResolverManager::new(call, context(prompt));

        let err = resolver.run().await.unwrap_err();
        assert!(matches!(err, WalletError::TwoFactor(TwoFactorError::AttemptsExhausted)));
        assert_eq!(resolver.wrong_codes(), 3);
    }

    #[tokio::test]
    async fn engine_error_status_is_failure() {
        let call = ScriptedCall::new(vec![json!({ "status": "error", "error": "id_login_failed" })]);
        let mut resolver = ResolverManager::new(call, context(Prompt::new(vec![])));
        let err = resolver.run().await.unwrap_err();
        assert!(matches!(err, WalletError::TwoFactor(TwoFactorError::Failure(ref e)) if e == "id_login_failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_without_connection() {
        let call = ScriptedCall::new(vec![json!({ "status": "call" })]);
        let ctx = context(Prompt::new(vec![])).with_connection_probe(Arc::new(|| false));
        let mut resolver = ResolverManager::new(call, ctx);
        let err = resolver.run().await.unwrap_err();
        assert!(matches!(err, WalletError::TwoFactor(TwoFactorError::ConnectionTimeout)));
    }
}
