use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::models::{ApplyTo, Discount, DiscountAmount, DiscountType, OrderItem};
use crate::services::discount_service::DiscountError;

/// Decide whether `user_id` may apply `discount` to the order at `now` and
/// compute the resulting amounts.
///
/// Rejections, in order:
/// - missing or inactive discount, exhausted uses, outside the active window: `NotFound`
/// - order total below `min_order_value`, per-user cap reached, no eligible
///   product for a `specific` discount: `BadRequest`
///
/// The discount amount is capped at `max_value` when set, and never exceeds
/// the order total.
pub fn check_amount(
    discount: Option<&Discount>,
    user_id: Uuid,
    items: &[OrderItem],
    now: DateTime<Utc>,
) -> Result<DiscountAmount, DiscountError> {
    let discount = discount
        .filter(|d| d.is_active)
        .ok_or_else(|| DiscountError::not_found("Discount code not found"))?;

    if discount.max_use <= 0 {
        return Err(DiscountError::not_found("Discount code has been fully redeemed"));
    }

    if now < discount.start_date || now > discount.end_date {
        return Err(DiscountError::not_found("Discount code has expired"));
    }

    if items.iter().any(|item| item.price < Decimal::ZERO) {
        return Err(DiscountError::bad_request("Product price must not be negative"));
    }

    let total_order = sum_lines(items.iter())?;

    if discount.min_order_value > Decimal::ZERO && total_order < discount.min_order_value {
        return Err(DiscountError::bad_request(format!(
            "Discount requires a minimum order value of {}",
            discount.min_order_value.normalize()
        )));
    }

    if discount.max_use_per_user > 0 && discount.uses_by(user_id) >= discount.max_use_per_user as usize {
        return Err(DiscountError::bad_request(
            "Discount code has reached the maximum number of uses for this user",
        ));
    }

    let eligible_total = match discount.apply_to {
        ApplyTo::All => total_order,
        ApplyTo::Specific => {
            let eligible: Vec<&OrderItem> = items
                .iter()
                .filter(|item| discount.applies_to_product(item.product_id))
                .collect();
            if eligible.is_empty() {
                return Err(DiscountError::bad_request(
                    "Discount code does not apply to any product in this order",
                ));
            }
            sum_lines(eligible.into_iter())?
        }
    };

    let mut amount = match discount.discount_type {
        DiscountType::FixedAmount => discount.value,
        DiscountType::Percentage => discount
            .value
            .checked_div(Decimal::ONE_HUNDRED)
            .and_then(|rate| rate.checked_mul(eligible_total))
            .ok_or_else(out_of_range)?,
    };
    if let Some(max_value) = discount.max_value {
        amount = amount.min(max_value);
    }
    let amount = amount.min(total_order).max(Decimal::ZERO);

    Ok(DiscountAmount {
        total_order: total_order.normalize(),
        discount_amount: amount.normalize(),
        total_order_after_discount: (total_order - amount).normalize(),
    })
}

fn sum_lines<'a>(mut items: impl Iterator<Item = &'a OrderItem>) -> Result<Decimal, DiscountError> {
    items.try_fold(Decimal::ZERO, |total, item| {
        item.line_total()
            .and_then(|line| total.checked_add(line))
            .ok_or_else(out_of_range)
    })
}

fn out_of_range() -> DiscountError {
    DiscountError::bad_request("Order total is out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn discount(discount_type: DiscountType, value: Decimal) -> Discount {
        let now = Utc::now();
        Discount {
            id: Uuid::new_v4(),
            code: "SHOP-10".to_string(),
            shop_owner: Uuid::new_v4(),
            name: "Ten off".to_string(),
            description: String::new(),
            discount_type,
            value,
            max_value: None,
            min_order_value: Decimal::ZERO,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(1),
            max_use: 100,
            use_count: 0,
            max_use_per_user: 0,
            users_used: vec![],
            is_active: true,
            apply_to: ApplyTo::All,
            product_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn order(total: Decimal) -> Vec<OrderItem> {
        vec![OrderItem {
            product_id: Uuid::new_v4(),
            quantity: 1,
            price: total,
        }]
    }

    #[test]
    fn fixed_amount_is_subtracted() {
        let d = discount(DiscountType::FixedAmount, dec!(10000));
        let result = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(50000)), Utc::now()).unwrap();
        assert_eq!(result.total_order, dec!(50000));
        assert_eq!(result.discount_amount, dec!(10000));
        assert_eq!(result.total_order_after_discount, dec!(40000));
    }

    #[test]
    fn percentage_applies_to_order_total() {
        let d = discount(DiscountType::Percentage, dec!(10));
        let items = vec![
            OrderItem { product_id: Uuid::new_v4(), quantity: 2, price: dec!(30000) },
            OrderItem { product_id: Uuid::new_v4(), quantity: 1, price: dec!(40000) },
        ];
        let result = check_amount(Some(&d), Uuid::new_v4(), &items, Utc::now()).unwrap();
        assert_eq!(result.total_order, dec!(100000));
        assert_eq!(result.discount_amount, dec!(10000));
        assert_eq!(result.total_order_after_discount, dec!(90000));
    }

    #[test]
    fn missing_or_inactive_discount_is_not_found() {
        let err = check_amount(None, Uuid::new_v4(), &order(dec!(10)), Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::NotFound(_)));

        let mut d = discount(DiscountType::FixedAmount, dec!(1));
        d.is_active = false;
        let err = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(10)), Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::NotFound(_)));
    }

    #[test]
    fn exhausted_discount_is_not_found() {
        let mut d = discount(DiscountType::FixedAmount, dec!(1));
        d.max_use = 0;
        let err = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(10)), Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::NotFound(_)));
    }

    #[test]
    fn outside_window_is_not_found() {
        let d = discount(DiscountType::FixedAmount, dec!(1));
        let after = d.end_date + Duration::seconds(1);
        let err = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(10)), after).unwrap_err();
        assert!(matches!(err, DiscountError::NotFound(_)));

        let before = d.start_date - Duration::seconds(1);
        let err = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(10)), before).unwrap_err();
        assert!(matches!(err, DiscountError::NotFound(_)));
    }

    #[test]
    fn min_order_value_gates_the_discount() {
        let mut d = discount(DiscountType::FixedAmount, dec!(100));
        d.min_order_value = dec!(500);

        let err = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(499.99)), Utc::now()).unwrap_err();
        match err {
            DiscountError::BadRequest(msg) => assert!(msg.contains("500")),
            other => panic!("unexpected error: {:?}", other),
        }

        let at = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(500)), Utc::now()).unwrap();
        assert_eq!(at.discount_amount, dec!(100));
        let above = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(800)), Utc::now()).unwrap();
        assert_eq!(above.total_order_after_discount, dec!(700));
    }

    #[test]
    fn oversized_order_is_rejected() {
        let d = discount(DiscountType::FixedAmount, dec!(100));
        let items = vec![OrderItem { product_id: Uuid::new_v4(), quantity: 10, price: Decimal::MAX }];
        let err = check_amount(Some(&d), Uuid::new_v4(), &items, Utc::now()).unwrap_err();
        match err {
            DiscountError::BadRequest(msg) => assert_eq!(msg, "Order total is out of range"),
            other => panic!("unexpected error: {:?}", other),
        }

        // each line fits, the sum does not
        let items = vec![
            OrderItem { product_id: Uuid::new_v4(), quantity: 1, price: Decimal::MAX },
            OrderItem { product_id: Uuid::new_v4(), quantity: 1, price: Decimal::MAX },
        ];
        let err = check_amount(Some(&d), Uuid::new_v4(), &items, Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::BadRequest(_)));
    }

    #[test]
    fn large_percentage_order_stays_in_range() {
        let d = discount(DiscountType::Percentage, dec!(100));
        let result = check_amount(Some(&d), Uuid::new_v4(), &order(Decimal::MAX), Utc::now()).unwrap();
        assert_eq!(result.total_order_after_discount, Decimal::ZERO);
    }

    #[test]
    fn negative_price_is_rejected() {
        let d = discount(DiscountType::FixedAmount, dec!(10));
        let err = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(-100)), Utc::now()).unwrap_err();
        match err {
            DiscountError::BadRequest(msg) => assert!(msg.contains("negative")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn per_user_cap_rejects_repeat_use() {
        let user = Uuid::new_v4();
        let mut d = discount(DiscountType::FixedAmount, dec!(5));
        d.max_use_per_user = 1;
        d.users_used = vec![user];

        let err = check_amount(Some(&d), user, &order(dec!(50)), Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::BadRequest(_)));

        // a different user is unaffected
        assert!(check_amount(Some(&d), Uuid::new_v4(), &order(dec!(50)), Utc::now()).is_ok());
    }

    #[test]
    fn amount_is_capped_by_max_value_and_order_total() {
        let mut d = discount(DiscountType::Percentage, dec!(50));
        d.max_value = Some(dec!(20));
        let result = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(100)), Utc::now()).unwrap();
        assert_eq!(result.discount_amount, dec!(20));
        assert_eq!(result.total_order_after_discount, dec!(80));

        let d = discount(DiscountType::FixedAmount, dec!(300));
        let result = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(120)), Utc::now()).unwrap();
        assert_eq!(result.discount_amount, dec!(120));
        assert_eq!(result.total_order_after_discount, Decimal::ZERO);
    }

    #[test]
    fn specific_scope_discounts_only_eligible_lines() {
        let eligible = Uuid::new_v4();
        let mut d = discount(DiscountType::Percentage, dec!(10));
        d.apply_to = ApplyTo::Specific;
        d.product_ids = vec![eligible];

        let items = vec![
            OrderItem { product_id: eligible, quantity: 1, price: dec!(1000) },
            OrderItem { product_id: Uuid::new_v4(), quantity: 1, price: dec!(9000) },
        ];
        let result = check_amount(Some(&d), Uuid::new_v4(), &items, Utc::now()).unwrap();
        assert_eq!(result.total_order, dec!(10000));
        assert_eq!(result.discount_amount, dec!(100));

        let err = check_amount(Some(&d), Uuid::new_v4(), &order(dec!(10)), Utc::now()).unwrap_err();
        assert!(matches!(err, DiscountError::BadRequest(_)));
    }
}
