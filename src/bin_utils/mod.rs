//! Batch driver around [`Payments`](crate::payments::Payments).
//!
//! Lives in the library so the integration tests can run the same code as the binary.

use std::{
    collections::HashMap,
    io::{Read, Write},
};

use anyhow::Result;
use csv_parser::{CsvOperationParser, Operation, OperationKind};
use csv_printer::{BalanceRow, print_balances};
use json_writer::{Response, write_response};

use crate::{
    account::AccountId,
    command::{TransferRequest, parse_amount},
    config::LedgerConfig,
    engine::TransferError,
    payments::Payments,
    store::TransferStore,
};

pub mod csv_parser;
pub mod csv_printer;
pub mod json_writer;

pub struct Service<'w, R, W: 'w, B: 'w> {
    pub input: R,
    pub responses: &'w mut W,
    pub balances: &'w mut B,
    pub config: LedgerConfig,
    pub error_printer: Box<dyn FnMut(u64, csv::Error)>,
}

impl<'w, R, W, B> Service<'w, R, W, B>
where
    R: Read,
    W: Write + 'w,
    B: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvOperationParser::new(self.input);

        let payments = Payments::in_memory(self.config)?;
        let mut users: HashMap<String, AccountId> = HashMap::new();

        for (line, row) in parser {
            let operation = match row {
                Ok(operation) => operation,
                Err(err) => {
                    (self.error_printer)(line, err);
                    continue;
                }
            };
            let response = execute(&payments, &mut users, line, operation)?;
            write_response(&mut *self.responses, &response)?;
        }

        let aliases: HashMap<&str, &str> = users
            .iter()
            .map(|(user, id)| (id.as_str(), user.as_str()))
            .collect();
        print_balances(
            self.balances,
            payments.accounts()?.into_iter().map(|acc| BalanceRow {
                user: aliases
                    .get(acc.id())
                    .map(|user| user.to_string())
                    .unwrap_or_default(),
                name: acc.name().to_string(),
                balance: acc.balance(),
                id: acc.id().to_string(),
            }),
        )
    }
}

fn execute<S>(
    payments: &Payments<S>,
    users: &mut HashMap<String, AccountId>,
    line: u64,
    operation: Operation,
) -> Result<Response>
where
    S: TransferStore,
{
    let resolve = |users: &HashMap<String, AccountId>, user: &str| {
        users.get(user).cloned().unwrap_or_else(|| user.to_string())
    };
    let kind = operation.kind;

    match kind {
        OperationKind::Open => {
            if users.contains_key(&operation.user) {
                return Ok(Response::err(
                    line,
                    kind,
                    "DuplicateUser",
                    "This user already has an account.",
                ));
            }
            let name = operation.name.unwrap_or_else(|| operation.user.clone());
            let account = payments.create_account(&name)?;
            users.insert(operation.user, account.id().to_string());
            Ok(Response::ok(line, kind, &account)?)
        }
        OperationKind::Transfer => {
            let amount = match operation.amount.as_deref().map(parse_amount).transpose() {
                Ok(amount) => amount,
                Err(err) => {
                    let err = TransferError::from(err);
                    return Ok(Response::err(line, kind, err.kind(), err.user_message()));
                }
            };
            let request = TransferRequest {
                sender_id: resolve(users, &operation.user),
                recipient_id: operation
                    .recipient
                    .map(|recipient| resolve(users, &recipient))
                    .unwrap_or_default(),
                amount,
                attempt_id: operation.attempt,
            };
            match payments.transfer(request) {
                Ok(receipt) => Ok(Response::ok(line, kind, &receipt)?),
                Err(err) => {
                    tracing::debug!(line, "transfer failed: {err}");
                    Ok(Response::err(line, kind, err.kind(), err.user_message()))
                }
            }
        }
        OperationKind::History => match payments.history(&resolve(users, &operation.user)) {
            Ok(history) => Ok(Response::ok(line, kind, &history)?),
            Err(err) => Ok(Response::err(line, kind, err.kind(), err.user_message())),
        },
    }
}
