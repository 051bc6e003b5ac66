use tally_core::TransactionTypeTag;

use crate::util::{first_match, KeywordTable};

/// Statement-line keyword families, checked in order against the raw
/// description. Transfers must stay above check deposits ("deposit from").
const TYPE_KEYWORDS: &KeywordTable<TransactionTypeTag> = &[
    (TransactionTypeTag::Recurring, &["recurring", "autopay", "subscription"]),
    (
        TransactionTypeTag::Debit,
        &["card purchase", "debit card", "pos purchase", "pos debit", "purchase"],
    ),
    (
        TransactionTypeTag::TransferIn,
        &[
            "online transfer from",
            "transfer from",
            "zelle payment from",
            "zelle from",
            "deposit from",
            "direct deposit",
            "ach credit",
        ],
    ),
    (
        TransactionTypeTag::CheckDeposit,
        &["remote online deposit", "mobile deposit", "check deposit", "deposit"],
    ),
    (
        TransactionTypeTag::CashWithdrawal,
        &["atm withdrawal", "atm cash", "cash withdrawal", "withdrawal"],
    ),
    (
        TransactionTypeTag::BillPay,
        &["bill pay", "online payment", "payment to", "e-payment", "epay", "ach debit"],
    ),
    (TransactionTypeTag::Refund, &["refund", "return", "reversal"]),
];

/// Exactly one tag per description; `Other` when nothing matches.
pub fn classify(raw_description: &str) -> TransactionTypeTag {
    first_match(TYPE_KEYWORDS, raw_description).unwrap_or(TransactionTypeTag::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_family() {
        let cases = [
            ("Recurring Card Purchase 01/03 Netflix.Com", TransactionTypeTag::Recurring),
            ("Card Purchase 01/14 Starbucks Store 123", TransactionTypeTag::Debit),
            ("Online Transfer From Chk ...7788", TransactionTypeTag::TransferIn),
            ("Zelle Payment From Jane Doe", TransactionTypeTag::TransferIn),
            ("Remote Online Deposit 1", TransactionTypeTag::CheckDeposit),
            ("ATM Withdrawal 01/20 Main St", TransactionTypeTag::CashWithdrawal),
            ("Online Payment 1234 To Comcast", TransactionTypeTag::BillPay),
            ("Discover E-Payment 8148 Web ID: 2510020270", TransactionTypeTag::BillPay),
            ("Amazon Refund", TransactionTypeTag::Refund),
            ("Monthly Service Fee", TransactionTypeTag::Other),
        ];
        for (desc, expected) in cases {
            assert_eq!(classify(desc), expected, "description: {desc}");
        }
    }

    #[test]
    fn first_family_wins() {
        // Both recurring and debit keywords are present.
        assert_eq!(
            classify("Recurring Card Purchase 02/01 Spotify"),
            TransactionTypeTag::Recurring
        );
        // "Card Purchase Return" hits the debit family before the refund one.
        assert_eq!(
            classify("Card Purchase Return 02/03 Target"),
            TransactionTypeTag::Debit
        );
        // "deposit from" is a transfer, not a check deposit.
        assert_eq!(classify("Deposit From Savings"), TransactionTypeTag::TransferIn);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(classify("ATM CASH 0042"), TransactionTypeTag::CashWithdrawal);
        assert_eq!(classify("payroll DIRECT DEPOSIT"), TransactionTypeTag::TransferIn);
    }

    #[test]
    fn blank_is_other() {
        assert_eq!(classify(""), TransactionTypeTag::Other);
    }
}
