//! Actions run by adaptive triggers

use super::expression::Expression;
use crate::errors::{DialogError, DialogResult};

/// Memory area an action may write to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyScope {
    /// Frame values, visible as `dialog.*` and persisted with the stack
    Dialog,
    /// Turn memory, discarded at the end of the turn
    Turn,
}

/// A writable memory location such as `dialog.order.size`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    pub scope: PropertyScope,
    pub path: String,
}

impl PropertyPath {
    pub fn parse(raw: &str) -> DialogResult<Self> {
        let (scope, path) = match raw.trim().split_once('.') {
            Some(("dialog", path)) => (PropertyScope::Dialog, path),
            Some(("turn", path)) => (PropertyScope::Turn, path),
            _ => {
                return Err(DialogError::invalid_expression(
                    raw,
                    "properties must start with 'dialog.' or 'turn.'",
                ));
            }
        };
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(DialogError::invalid_expression(raw, "empty path segment"));
        }
        Ok(Self {
            scope,
            path: path.to_string(),
        })
    }
}

/// One operation of a trigger's action sequence
#[derive(Debug, Clone)]
pub enum Action {
    /// Emit a literal or `${Template}` message
    SendActivity(String),
    SetProperty {
        property: PropertyPath,
        value: Expression,
    },
    DeleteProperty(PropertyPath),
    IfCondition {
        condition: Expression,
        then: Vec<Action>,
        otherwise: Vec<Action>,
    },
    /// Run `actions` once per element, binding `foreach.index` and `foreach.value`
    ForEach {
        items: Expression,
        actions: Vec<Action>,
    },
    /// Push a child dialog; its result is written to `result_property`
    BeginDialog {
        dialog_id: String,
        options: Option<Expression>,
        result_property: Option<PropertyPath>,
    },
    /// End this dialog with the value, or `dialog.result` when absent
    EndDialog(Option<Expression>),
    CancelAllDialogs,
    /// Restart this dialog with its original options
    RepeatDialog,
    /// Stop for this turn; the remaining actions run on the next one
    EndTurn,
}

impl Action {
    pub fn send(text: impl Into<String>) -> Self {
        Self::SendActivity(text.into())
    }

    pub fn set_property(property: &str, value: &str) -> DialogResult<Self> {
        Ok(Self::SetProperty {
            property: PropertyPath::parse(property)?,
            value: Expression::parse(value)?,
        })
    }

    pub fn delete_property(property: &str) -> DialogResult<Self> {
        Ok(Self::DeleteProperty(PropertyPath::parse(property)?))
    }

    pub fn if_condition(
        condition: &str,
        then: Vec<Action>,
        otherwise: Vec<Action>,
    ) -> DialogResult<Self> {
        Ok(Self::IfCondition {
            condition: Expression::parse(condition)?,
            then,
            otherwise,
        })
    }

    pub fn for_each(items: &str, actions: Vec<Action>) -> DialogResult<Self> {
        Ok(Self::ForEach {
            items: Expression::parse(items)?,
            actions,
        })
    }

    pub fn begin_dialog(dialog_id: impl Into<String>) -> Self {
        Self::BeginDialog {
            dialog_id: dialog_id.into(),
            options: None,
            result_property: None,
        }
    }

    /// Options expression for a `BeginDialog`; ignored on other actions
    pub fn with_options(mut self, expression: &str) -> DialogResult<Self> {
        if let Self::BeginDialog { options, .. } = &mut self {
            *options = Some(Expression::parse(expression)?);
        }
        Ok(self)
    }

    /// Result property for a `BeginDialog`; ignored on other actions
    pub fn with_result_property(mut self, property: &str) -> DialogResult<Self> {
        if let Self::BeginDialog {
            result_property, ..
        } = &mut self
        {
            *result_property = Some(PropertyPath::parse(property)?);
        }
        Ok(self)
    }

    pub fn end_dialog(value: Option<&str>) -> DialogResult<Self> {
        Ok(Self::EndDialog(value.map(Expression::parse).transpose()?))
    }

    /// Nested action list addressed by `branch`
    ///
    /// `IfCondition` has `then` at 0 and `otherwise` at 1; `ForEach` has its
    /// body at 0.
    pub fn branch(&self, branch: usize) -> Option<&[Action]> {
        match (self, branch) {
            (Self::IfCondition { then, .. }, 0) => Some(then.as_slice()),
            (Self::IfCondition { otherwise, .. }, 1) => Some(otherwise.as_slice()),
            (Self::ForEach { actions, .. }, 0) => Some(actions.as_slice()),
            _ => None,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendActivity(_) => "sendActivity",
            Self::SetProperty { .. } => "setProperty",
            Self::DeleteProperty(_) => "deleteProperty",
            Self::IfCondition { .. } => "ifCondition",
            Self::ForEach { .. } => "forEach",
            Self::BeginDialog { .. } => "beginDialog",
            Self::EndDialog(_) => "endDialog",
            Self::CancelAllDialogs => "cancelAllDialogs",
            Self::RepeatDialog => "repeatDialog",
            Self::EndTurn => "endTurn",
        }
    }
}
