use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use crate::solver::{ChallengeAction, ChallengeRequest, Solver};

const PAYLOAD_KIND: &str = "ChallengePayload";
const API_VERSION: &str = "v1alpha1";

/// Envelope exchanged with the webhook framework.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayload {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ChallengeRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ChallengeResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChallengeResponse {
    pub uid: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Status {
    pub status: String,
    pub message: String,
}

impl ChallengeResponse {
    fn success(uid: String) -> Self {
        Self {
            uid,
            success: true,
            status: None,
        }
    }

    fn failure(uid: String, message: String) -> Self {
        Self {
            uid,
            success: false,
            status: Some(Status {
                status: "Failure".to_owned(),
                message,
            }),
        }
    }
}

/// Dispatches challenge payloads of one API group to a solver.
pub struct Webhook<S: Solver> {
    group_name: String,
    solver: S,
}

impl<S: Solver> Webhook<S> {
    pub fn new(group_name: String, solver: S) -> Self {
        Self { group_name, solver }
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    fn api_version(&self) -> String {
        format!("{}/{}", self.group_name, API_VERSION)
    }

    fn reply(&self, response: ChallengeResponse) -> ChallengePayload {
        ChallengePayload {
            api_version: self.api_version(),
            kind: PAYLOAD_KIND.to_owned(),
            request: None,
            response: Some(response),
        }
    }

    pub async fn handle(&self, payload: ChallengePayload) -> ChallengePayload {
        let Some(request) = payload.request else {
            warn!("received payload without request");
            return self.reply(ChallengeResponse::failure(
                String::new(),
                "payload does not contain a request".to_owned(),
            ));
        };

        let result = match request.action {
            ChallengeAction::Present => self.solver.present(&request).await,
            ChallengeAction::CleanUp => self.solver.cleanup(&request).await,
            ChallengeAction::Unknown => {
                warn!(uid = %request.uid, "unsupported challenge action");
                return self.reply(ChallengeResponse::failure(
                    request.uid,
                    "unsupported challenge action".to_owned(),
                ));
            }
        };

        let response = match result {
            Ok(()) => ChallengeResponse::success(request.uid),
            Err(e) => {
                error!(uid = %request.uid, action = ?request.action, "challenge failed: {}", e);
                ChallengeResponse::failure(request.uid, e.to_string())
            }
        };
        self.reply(response)
    }

    /// Handles newline-delimited payloads until the reader is exhausted,
    /// writing one response line per payload.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            solver = self.solver.name(),
            api_version = %self.api_version(),
            "serving challenge payloads"
        );
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let reply = match serde_json::from_str::<ChallengePayload>(&line) {
                Ok(payload) => self.handle(payload).await,
                Err(e) => {
                    warn!("unable to decode payload: {}", e);
                    self.reply(ChallengeResponse::failure(
                        String::new(),
                        format!("unable to decode payload: {e}"),
                    ))
                }
            };

            let mut out = serde_json::to_vec(&reply)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use thiserror::Error;
    use tokio::sync::watch;

    #[derive(Debug, Error)]
    #[error("provider unavailable")]
    struct Unavailable;

    #[derive(Default)]
    struct RecordingSolver {
        calls: Mutex<Vec<(ChallengeAction, String)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Solver for RecordingSolver {
        type Error = Unavailable;

        fn name(&self) -> &str {
            "recording"
        }

        async fn initialize(
            &mut self,
            _cluster: kube::Config,
            _stop: watch::Receiver<bool>,
        ) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn present(&self, ch: &ChallengeRequest) -> Result<(), Self::Error> {
            self.calls.lock().unwrap().push((ChallengeAction::Present, ch.key.clone()));
            if self.fail { Err(Unavailable) } else { Ok(()) }
        }

        async fn cleanup(&self, ch: &ChallengeRequest) -> Result<(), Self::Error> {
            self.calls.lock().unwrap().push((ChallengeAction::CleanUp, ch.key.clone()));
            if self.fail { Err(Unavailable) } else { Ok(()) }
        }
    }

    fn payload(action: &str) -> ChallengePayload {
        serde_json::from_value(json!({
            "apiVersion": "acme.example.com/v1alpha1",
            "kind": "ChallengePayload",
            "request": {"uid": "uid-1", "action": action, "key": "abc123"},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn dispatches_actions() {
        let webhook = Webhook::new("acme.example.com".to_owned(), RecordingSolver::default());

        let reply = webhook.handle(payload("Present")).await;
        assert_eq!(reply.api_version, "acme.example.com/v1alpha1");
        assert_eq!(reply.kind, "ChallengePayload");
        assert_eq!(reply.response, Some(ChallengeResponse::success("uid-1".to_owned())));

        webhook.handle(payload("CleanUp")).await;

        assert_eq!(
            *webhook.solver().calls.lock().unwrap(),
            vec![
                (ChallengeAction::Present, "abc123".to_owned()),
                (ChallengeAction::CleanUp, "abc123".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn reports_solver_errors() {
        let solver = RecordingSolver { fail: true, ..Default::default() };
        let webhook = Webhook::new("acme.example.com".to_owned(), solver);

        let response = webhook.handle(payload("Present")).await.response.unwrap();

        assert!(!response.success);
        assert_eq!(response.uid, "uid-1");
        assert_eq!(response.status.unwrap().message, "provider unavailable");
    }

    #[tokio::test]
    async fn rejects_unknown_action_and_missing_request() {
        let webhook = Webhook::new("acme.example.com".to_owned(), RecordingSolver::default());

        let response = webhook.handle(payload("Rotate")).await.response.unwrap();
        assert!(!response.success);
        assert!(webhook.solver().calls.lock().unwrap().is_empty());

        let response = webhook.handle(ChallengePayload::default()).await.response.unwrap();
        assert!(!response.success);
        assert_eq!(response.uid, "");
    }

    #[tokio::test]
    async fn serves_line_delimited_payloads() {
        let webhook = Webhook::new("acme.example.com".to_owned(), RecordingSolver::default());
        let input = format!(
            "{}\n\nnot json\n",
            serde_json::to_string(&payload("Present")).unwrap()
        );
        let mut output = Vec::new();

        webhook.serve(input.as_bytes(), &mut output).await.unwrap();

        let replies: Vec<ChallengePayload> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert!(replies[0].response.as_ref().unwrap().success);
        assert!(!replies[1].response.as_ref().unwrap().success);
    }
}
