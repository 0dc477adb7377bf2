//! Plan execution.
//!
//! A [`BulkPlan`] is a sequence of statements of which exactly one returns
//! the result rows. Transactional plans run inside a transaction that is
//! rolled back when any step fails or the call is cancelled.

use asupersync::{Cx, Outcome};
use sqlbulk_core::{Connection, Error, Row, TransactionOps, Value};
use sqlbulk_query::{BulkPlan, PlanStep};

/// Where plan steps are sent: the bare connection or an open transaction.
trait StepRunner: Sync {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}

struct Direct<'a, C>(&'a C);

impl<C: Connection> StepRunner for Direct<'_, C> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.0.query(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.0.execute(cx, sql, params)
    }
}

struct InTransaction<'a, T>(&'a T);

impl<T: TransactionOps> StepRunner for InTransaction<'_, T> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.0.query(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.0.execute(cx, sql, params)
    }
}

/// Run a plan and return the rows of its query step.
pub(crate) async fn run_plan<C: Connection>(
    cx: &Cx,
    conn: &C,
    plan: &BulkPlan,
) -> Outcome<Vec<Row>, Error> {
    if !plan.transactional {
        return run_steps(cx, &Direct(conn), &plan.steps).await;
    }

    if let Some(reason) = cx.cancel_reason() {
        return Outcome::Cancelled(reason);
    }
    let tx = match conn.begin(cx).await {
        Outcome::Ok(tx) => tx,
        Outcome::Err(e) => return Outcome::Err(e),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };

    let outcome = run_steps(cx, &InTransaction(&tx), &plan.steps).await;
    match outcome {
        Outcome::Ok(rows) => match tx.commit(cx).await {
            Outcome::Ok(()) => Outcome::Ok(rows),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        },
        failed => {
            match tx.rollback(cx).await {
                Outcome::Ok(()) => tracing::debug!("Rolled back bulk transaction"),
                Outcome::Err(e) => tracing::warn!(error = %e, "Rollback of bulk transaction failed"),
                Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                    tracing::warn!("Rollback of bulk transaction did not complete");
                }
            }
            failed
        }
    }
}

async fn run_steps<R: StepRunner>(cx: &Cx, runner: &R, steps: &[PlanStep]) -> Outcome<Vec<Row>, Error> {
    let mut result = None;
    for step in steps {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let stmt = step.statement();
        tracing::trace!(sql = %stmt.sql, params = stmt.params.len(), "Executing bulk statement");
        match step {
            PlanStep::Execute(_) => match runner.execute(cx, &stmt.sql, &stmt.params).await {
                Outcome::Ok(_) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            },
            PlanStep::Query(_) => match runner.query(cx, &stmt.sql, &stmt.params).await {
                Outcome::Ok(rows) => result = Some(rows),
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            },
        }
    }
    Outcome::Ok(result.unwrap_or_default())
}
