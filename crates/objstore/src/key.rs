// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object keys: `{kind}/{tenant}/{project}/{session}/{filename}`.
//!
//! Keys are built from typed parts, so a well-formed key is the only
//! kind the gateway can produce; agent-supplied keys are re-parsed and
//! rejected when they fall outside the expected prefix.

use fl_core::{ProjectId, SessionId, TenantId};

use crate::ObjStoreError;

/// Asset classes stored under their own top-level prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Screenshot,
    Dom,
    LogBundle,
    VerificationAsset,
}

impl ObjectKind {
    pub fn prefix(self) -> &'static str {
        match self {
            ObjectKind::Screenshot => "screenshots",
            ObjectKind::Dom => "dom",
            ObjectKind::LogBundle => "logs",
            ObjectKind::VerificationAsset => "verification",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "screenshots" => Some(ObjectKind::Screenshot),
            "dom" => Some(ObjectKind::Dom),
            "logs" => Some(ObjectKind::LogBundle),
            "verification" => Some(ObjectKind::VerificationAsset),
            _ => None,
        }
    }
}

/// A validated object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub filename: String,
}

impl ObjectKey {
    pub fn new(
        kind: ObjectKind,
        tenant_id: TenantId,
        project_id: ProjectId,
        session_id: SessionId,
        filename: impl Into<String>,
    ) -> Result<Self, ObjStoreError> {
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self { kind, tenant_id, project_id, session_id, filename })
    }

    /// Parse and validate an externally supplied key.
    pub fn parse(raw: &str) -> Result<Self, ObjStoreError> {
        let parts: Vec<&str> = raw.split('/').collect();
        let [kind, tenant, project, session, filename] = parts.as_slice() else {
            return Err(ObjStoreError::InvalidKey(format!(
                "expected 5 path segments, got {}",
                parts.len()
            )));
        };
        let kind = ObjectKind::from_prefix(kind)
            .ok_or_else(|| ObjStoreError::InvalidKey(format!("unknown kind '{kind}'")))?;
        let tenant_id = tenant
            .parse::<i64>()
            .map(TenantId)
            .map_err(|_| ObjStoreError::InvalidKey("tenant segment is not numeric".into()))?;
        let project_id = project
            .parse::<i64>()
            .map(ProjectId)
            .map_err(|_| ObjStoreError::InvalidKey("project segment is not numeric".into()))?;
        if !session.starts_with(SessionId::PREFIX) {
            return Err(ObjStoreError::InvalidKey(
                "session segment is not a session id".into(),
            ));
        }
        validate_filename(filename)?;
        Ok(Self {
            kind,
            tenant_id,
            project_id,
            session_id: SessionId::from_string(*session),
            filename: (*filename).to_string(),
        })
    }

    /// Parse a key and additionally require it to belong to `tenant_id`.
    pub fn parse_for_tenant(raw: &str, tenant_id: TenantId) -> Result<Self, ObjStoreError> {
        let key = Self::parse(raw)?;
        if key.tenant_id != tenant_id {
            return Err(ObjStoreError::InvalidKey(format!(
                "key belongs to tenant {}, caller is {}",
                key.tenant_id, tenant_id
            )));
        }
        Ok(key)
    }

    /// Render the storage key.
    pub fn render(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.kind.prefix(),
            self.tenant_id,
            self.project_id,
            self.session_id,
            self.filename
        )
    }

    /// Prefix covering everything a session wrote under one kind.
    pub fn session_prefix(
        kind: ObjectKind,
        tenant_id: TenantId,
        project_id: ProjectId,
        session_id: &SessionId,
    ) -> String {
        format!("{}/{}/{}/{}/", kind.prefix(), tenant_id, project_id, session_id)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn validate_filename(filename: &str) -> Result<(), ObjStoreError> {
    if filename.is_empty() || filename.len() > 255 {
        return Err(ObjStoreError::InvalidKey("bad filename length".into()));
    }
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(ObjStoreError::InvalidKey(
            "filename may not contain path separators".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
