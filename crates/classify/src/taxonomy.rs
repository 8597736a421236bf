/// Category → subcategories offered to the classifier. Rule targets use
/// the same names.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    ("Income", &["Salary", "Business Income", "Interest", "Dividend", "Refund", "Rental Income", "Other Income"]),
    ("Shopping", &["Online Shopping", "Groceries", "Electronics", "Clothing", "Home & Furniture", "Other Shopping"]),
    ("Food & Dining", &["Restaurant", "Food Delivery", "Cafe/Coffee", "Other Food"]),
    ("Transport", &["Fuel", "Cab/Taxi", "Public Transport", "Flight", "Train", "Other Travel"]),
    ("Bills & Utilities", &["Electricity", "Mobile/Internet", "Water", "Gas", "Rent", "Subscriptions", "Other Bills"]),
    ("Investments", &["Mutual Funds", "Stocks", "Fixed Deposit", "PPF", "NPS", "Other Investment"]),
    ("Insurance", &["Life Insurance", "Health Insurance", "Vehicle Insurance", "Other Insurance"]),
    ("Transfer", &["Bank Transfer", "Self Transfer", "Family Transfer"]),
    ("Healthcare", &["Hospital", "Pharmacy", "Doctor/Consultation", "Lab Tests"]),
    ("Education", &["School/College Fees", "Books", "Online Courses"]),
    ("Entertainment", &["Movies", "Events", "Gaming", "OTT Subscriptions"]),
    ("Taxes", &["GST Payment", "Income Tax", "TDS", "Professional Tax", "Tax Refund"]),
    ("Business Expense", &["Vendor Payment", "Professional Services", "Office Supplies"]),
    ("Cash", &["ATM Withdrawal", "Cash Deposit"]),
    ("Bank Charges", &["Service Charges", "Penalties", "Interest Paid"]),
    ("Other", &["Uncategorized"]),
];

/// One `- Category: Sub, Sub` line per category.
pub fn prompt_listing() -> String {
    CATEGORIES
        .iter()
        .map(|(c, subs)| format!("- {c}: {}", subs.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_has_every_category() {
        let listing = prompt_listing();
        assert_eq!(listing.lines().count(), CATEGORIES.len());
        assert!(listing.contains("- Cash: ATM Withdrawal, Cash Deposit"));
    }
}
