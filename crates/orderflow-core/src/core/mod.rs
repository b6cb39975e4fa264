// crates/orderflow-core/src/core/mod.rs
// ============================================================================
// Module: Orderflow Core Model
// Description: Canonical data model for cases, orders, committee, and audit.
// Purpose: Group the core value types shared by every Orderflow component.
// Dependencies: crate::core submodules
// ============================================================================

//! ## Overview
//! The core model is the language every Orderflow component speaks: opaque
//! identifiers, explicit timestamps, canonical hashing, the evidence-bearing
//! order representation, committee verdicts, match outcomes, fingerprints, and
//! the append-only audit record. All types serialize with stable snake_case
//! wire forms.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod case;
pub mod committee;
pub mod corrections;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod hashing;
pub mod identifiers;
pub mod issue;
pub mod matching;
pub mod order;
pub mod redact;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditManifest;
pub use audit::EventLogRef;
pub use audit::ManifestEntry;
pub use case::ApprovalRecord;
pub use case::CaseState;
pub use case::CaseStatus;
pub use case::PendingSelection;
pub use case::ResolvedCustomer;
pub use case::ResolvedLine;
pub use committee::CRITICAL_FIELDS;
pub use committee::ColumnCandidate;
pub use committee::ColumnStats;
pub use committee::CommitteeOutput;
pub use committee::CommitteeResponse;
pub use committee::CommitteeVerdict;
pub use committee::ConsensusClass;
pub use committee::Disagreement;
pub use committee::EvidencePack;
pub use committee::FieldDecision;
pub use committee::FieldMapping;
pub use committee::ProviderCallOutcome;
pub use committee::ProviderSpec;
pub use corrections::CorrectionError;
pub use corrections::CorrectionPatch;
pub use corrections::apply_corrections;
pub use error::EngineError;
pub use error::ErrorCode;
pub use error::ErrorKind;
pub use error::user_message;
pub use events::Actor;
pub use events::AuditEvent;
pub use events::BlobPointer;
pub use events::EventType;
pub use fingerprint::BucketGranularity;
pub use fingerprint::date_bucket;
pub use fingerprint::order_fingerprint;
pub use hashing::HashError;
pub use hashing::Sha256Digest;
pub use hashing::canonical_json_bytes;
pub use identifiers::CaseId;
pub use identifiers::ChatThreadId;
pub use identifiers::ColumnId;
pub use identifiers::CorrelationId;
pub use identifiers::CustomerId;
pub use identifiers::DraftId;
pub use identifiers::ItemId;
pub use identifiers::ProviderFamily;
pub use identifiers::ProviderId;
pub use identifiers::TenantId;
pub use identifiers::UserId;
pub use issue::Issue;
pub use issue::Severity;
pub use matching::CustomerMatch;
pub use matching::ItemMatch;
pub use matching::MatchCandidate;
pub use matching::MatchStatus;
pub use matching::PriceAudit;
pub use order::BlockedReason;
pub use order::CanonicalOrder;
pub use order::CustomerBlock;
pub use order::EvidenceCell;
pub use order::LineEvidence;
pub use order::LineItem;
pub use order::Money;
pub use order::OrderMeta;
pub use order::OrderTotals;
pub use redact::redact_text;
pub use redact::redact_value;
pub use self::time::Timestamp;
