use crate::domain::dividend::{DividendPayment, DividendPaymentStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct PayoutRow<'a> {
    payment: String,
    recipient: String,
    tokens: u64,
    amount: String,
    status: &'a str,
    failure_reason: &'a str,
}

/// Writes dividend payout rows as CSV.
///
/// Amounts are printed with exactly two decimal places.
pub struct PayoutWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PayoutWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments(&mut self, payments: &[DividendPayment]) -> Result<()> {
        for payment in payments {
            let status = match payment.status {
                DividendPaymentStatus::Pending => "pending",
                DividendPaymentStatus::Completed => "completed",
                DividendPaymentStatus::Failed => "failed",
            };
            self.writer.serialize(PayoutRow {
                payment: payment.id.to_string(),
                recipient: payment.recipient_id.to_string(),
                tokens: payment.tokens_held,
                amount: format!("{:.2}", payment.amount.value()),
                status,
                failure_reason: payment.failure_reason.as_deref().unwrap_or(""),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn payment(status: DividendPaymentStatus, reason: Option<&str>) -> DividendPayment {
        DividendPayment {
            id: Uuid::new_v4(),
            distribution_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            tokens_held: 3,
            amount: Amount::new(dec!(33.3)).unwrap(),
            status,
            failure_reason: reason.map(str::to_string),
            paid_at: None,
        }
    }

    #[test]
    fn test_writer_header_and_rows() {
        let mut out = Vec::new();
        {
            let mut writer = PayoutWriter::new(&mut out);
            writer
                .write_payments(&[
                    payment(DividendPaymentStatus::Completed, None),
                    payment(DividendPaymentStatus::Failed, Some("Wallet frozen")),
                ])
                .unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "payment,recipient,tokens,amount,status,failure_reason"
        );
        assert!(lines[1].ends_with(",3,33.30,completed,"));
        assert!(lines[2].ends_with(",failed,Wallet frozen"));
    }
}
