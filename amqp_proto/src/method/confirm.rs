use serde::{Deserialize, Serialize};

use crate::types::MethodId;

pub const METHOD_SELECT: MethodId = 10;
pub const METHOD_SELECT_OK: MethodId = 11;

/// Publisher confirms, a RabbitMQ extension.
#[derive(Debug, Clone)]
pub enum ConfirmMethod {
    Select(ConfirmSelect),
    SelectOk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmSelect {
    pub no_wait: bool,
}

impl ConfirmMethod {
    pub fn method_id(&self) -> MethodId {
        match self {
            ConfirmMethod::Select(_) => METHOD_SELECT,
            ConfirmMethod::SelectOk => METHOD_SELECT_OK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConfirmMethod::Select(_) => "confirm.select",
            ConfirmMethod::SelectOk => "confirm.select-ok",
        }
    }

    pub fn synchronous(&self) -> bool {
        matches!(self, ConfirmMethod::Select(_))
    }
}
