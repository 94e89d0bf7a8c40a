//! Reference agents
//!
//! Two built-in agents wire the capability traits into the core: the
//! scan agent turns scanner findings into sealed evidence, the
//! questionnaire agent answers security questionnaires with model help
//! and reuses prior answers through context similarity.

use crate::capability::{InferenceProvider, ScannerPlugin};
use async_trait::async_trait;
use grc_agents::{Agent, AgentConfig, CancelSignal};
use grc_common::{
    AgentKind, AgentRef, ContextType, CoreError, CoreResult, ErrorKind, EvidenceType, Framework,
    Scope, Sensitivity, Task, TaskResult,
};
use grc_context::{ContextEntry, ContextStore};
use grc_evidence::{EvidenceItem, EvidenceStore};
use serde_json::json;
use std::sync::Arc;

/// Collects cloud resources through a [`ScannerPlugin`] and stores each
/// finding set as evidence
///
/// Scanner credentials are read from the context store: a `secret` entry
/// owned by this agent, injected by the platform operator.
pub struct ScanAgent {
    config: AgentConfig,
    scanner: Arc<dyn ScannerPlugin>,
    context: Arc<ContextStore>,
    evidence: Arc<EvidenceStore>,
}

impl ScanAgent {
    /// Build a scan agent over a scanner plugin
    pub fn new(
        agent_id: &str,
        scanner: Arc<dyn ScannerPlugin>,
        context: Arc<ContextStore>,
        evidence: Arc<EvidenceStore>,
    ) -> Self {
        Self {
            config: AgentConfig::new(agent_id, AgentKind::SecurityScanner)
                .with_max_concurrent(2)
                .with_capabilities(["cloud_scan".to_string(), "resource_inventory".to_string()]),
            scanner,
            context,
            evidence,
        }
    }

    fn me(&self) -> AgentRef {
        AgentRef::new(&self.config.agent_id, self.config.kind)
    }

    async fn run_scan(&self, task: &Task, cancel: &CancelSignal) -> CoreResult<TaskResult> {
        let organization_id = &task.organization_id;
        let credentials_entry_id = task.payload["credentials_entry_id"]
            .as_str()
            .ok_or_else(|| CoreError::Permanent("missing credentials_entry_id".into()))?;
        let framework = serde_json::from_value::<Framework>(task.payload["framework"].clone())
            .unwrap_or(Framework::Soc2);
        let control_id = task.payload["control_id"].as_str().unwrap_or("CC6.1");

        let credentials = self
            .context
            .get(credentials_entry_id, organization_id, &self.me())
            .await?
            .ok_or_else(|| CoreError::NotFound("scanner credentials".into()))?;

        let resources = self
            .scanner
            .scan(&credentials.data, &task.payload["scope"])
            .await?;

        let mut evidence_refs = Vec::new();
        for resource in &resources {
            // Long scans observe cancellation between resources
            if cancel.is_cancelled() {
                return Err(CoreError::Transient("scan cancelled".into()));
            }
            let stored = self.evidence.store(EvidenceItem::new(
                &self.config.agent_id,
                EvidenceType::ScanResult,
                json!({
                    "resource_id": resource.id,
                    "resource_type": resource.resource_type,
                    "provider": resource.provider,
                    "region": resource.region,
                    "compliance_status": resource.compliance_status,
                    "findings": resource.findings,
                }),
                match resource.compliance_status.as_str() {
                    "compliant" | "non_compliant" => 0.95,
                    _ => 0.6,
                },
                framework,
                control_id,
                organization_id,
            ));
            evidence_refs.push(stored.evidence_id);
        }

        // Posture summary shared with assessors
        self.context
            .put(
                ContextEntry::new(
                    ContextType::Security,
                    Scope::AgentType,
                    Sensitivity::Internal,
                    json!({
                        "provider": self.scanner.provider(),
                        "resources_scanned": resources.len(),
                        "evidence_refs": evidence_refs,
                    }),
                    self.me(),
                    organization_id,
                )
                .with_allowed_agents([AgentKind::RiskAssessor, AgentKind::PolicyAnalyzer]),
            )
            .await?;

        Ok(
            TaskResult::ok(&task.task_id, json!({ "resources": resources.len() }))
                .with_evidence(evidence_refs),
        )
    }
}

#[async_trait]
impl Agent for ScanAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn initialize(&self) -> CoreResult<()> {
        // Connectivity probe: provider name resolvable means the plugin
        // is wired
        if self.scanner.provider().is_empty() {
            return Err(CoreError::Permanent("scanner plugin misconfigured".into()));
        }
        Ok(())
    }

    async fn execute(&self, task: &Task, cancel: &CancelSignal) -> TaskResult {
        match self.run_scan(task, cancel).await {
            Ok(result) => result,
            Err(err) => TaskResult::fail(&task.task_id, err.kind(), &err.to_string()),
        }
    }
}

/// Answers questionnaire questions, reusing near-duplicate answers from
/// learning context before calling the model
pub struct QuestionnaireAgent {
    config: AgentConfig,
    inference: Arc<dyn InferenceProvider>,
    context: Arc<ContextStore>,
    evidence: Arc<EvidenceStore>,
}

impl QuestionnaireAgent {
    /// Build a questionnaire agent over an inference provider
    pub fn new(
        agent_id: &str,
        inference: Arc<dyn InferenceProvider>,
        context: Arc<ContextStore>,
        evidence: Arc<EvidenceStore>,
    ) -> Self {
        Self {
            config: AgentConfig::new(agent_id, AgentKind::QuestionnaireProcessor)
                .with_max_concurrent(4)
                .with_capabilities(["questionnaire".to_string()]),
            inference,
            context,
            evidence,
        }
    }

    fn me(&self) -> AgentRef {
        AgentRef::new(&self.config.agent_id, self.config.kind)
    }

    async fn answer(&self, task: &Task, cancel: &CancelSignal) -> CoreResult<TaskResult> {
        let organization_id = &task.organization_id;
        let questions = task.payload["questions"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let framework = serde_json::from_value::<Framework>(task.payload["framework"].clone())
            .unwrap_or(Framework::Soc2);

        let mut answers = Vec::with_capacity(questions.len());
        let mut evidence_refs = Vec::new();
        let mut reused = 0usize;

        for question in &questions {
            if cancel.is_cancelled() {
                return Err(CoreError::Transient("questionnaire cancelled".into()));
            }
            let question_text = question["text"].as_str().unwrap_or_default();
            let control_id = question["control_id"].as_str().unwrap_or("CC1.1");

            // Near-duplicate of a previously answered question: reuse the
            // answer its learning entry points to
            let similar = self
                .context
                .find_similar(question, organization_id, &self.me(), 0.9)
                .await?;
            let prior_answer = match similar.first() {
                Some((entry, _)) => {
                    entry
                        .tags
                        .iter()
                        .find_map(|tag| tag.strip_prefix("answer_evidence:"))
                        .and_then(|evidence_id| self.evidence.get(evidence_id).ok())
                        .map(|item| item.content["answer"].as_str().unwrap_or_default().to_string())
                }
                None => None,
            };

            let answered_from_memory = prior_answer.is_some();
            let (answer_text, confidence) = match prior_answer {
                Some(answer) => {
                    reused += 1;
                    (answer, 0.95)
                }
                None => {
                    let completed = self
                        .inference
                        .complete(
                            &format!(
                                "Answer this security questionnaire question factually: {}",
                                question_text
                            ),
                            &json!({"max_tokens": 512}),
                        )
                        .await?;
                    (completed, 0.8)
                }
            };

            let stored = self.evidence.store(EvidenceItem::new(
                &self.config.agent_id,
                EvidenceType::Answer,
                json!({"question": question_text, "answer": answer_text}),
                confidence,
                framework,
                control_id,
                organization_id,
            ));

            // Remember the question for future near-duplicate reuse; the
            // entry embeds the bare question so probes match, and the tag
            // carries the pointer to the answer
            if !answered_from_memory {
                self.context
                    .put(
                        ContextEntry::new(
                            ContextType::Learning,
                            Scope::AgentType,
                            Sensitivity::Internal,
                            question.clone(),
                            self.me(),
                            organization_id,
                        )
                        .with_allowed_agents([AgentKind::QuestionnaireProcessor])
                        .with_tags([format!("answer_evidence:{}", stored.evidence_id)]),
                    )
                    .await?;
            }

            evidence_refs.push(stored.evidence_id.clone());
            answers.push(json!({
                "question": question_text,
                "answer": answer_text,
                "confidence": confidence,
                "evidence_id": stored.evidence_id,
            }));
        }

        Ok(TaskResult::ok(
            &task.task_id,
            json!({
                "answers": answers,
                "reused_answers": reused,
                "total_questions": questions.len(),
            }),
        )
        .with_evidence(evidence_refs))
    }
}

#[async_trait]
impl Agent for QuestionnaireAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn initialize(&self) -> CoreResult<()> {
        Ok(())
    }

    async fn execute(&self, task: &Task, cancel: &CancelSignal) -> TaskResult {
        match self.answer(task, cancel).await {
            Ok(result) => result,
            Err(err) => TaskResult::fail(&task.task_id, err.kind(), &err.to_string()),
        }
    }
}
