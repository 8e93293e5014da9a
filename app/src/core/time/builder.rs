#[macro_export]
macro_rules! t {
    (now) => {{
        $crate::core::time::DateTime::now()
    }};

    ($amount:literal seconds) => {{
        $crate::core::time::Duration::seconds($amount)
    }};
    ($amount:literal minutes) => {{
        $crate::core::time::Duration::minutes($amount)
    }};
    ($amount:literal hours) => {{
        $crate::core::time::Duration::hours($amount)
    }};

    ($amount:literal seconds ago) => {{
        $crate::t!(now) - $crate::t!($amount seconds)
    }};
    ($amount:literal minutes ago) => {{
        $crate::t!(now) - $crate::t!($amount minutes)
    }};
    ($amount:literal hours ago) => {{
        $crate::t!(now) - $crate::t!($amount hours)
    }};

    (in $amount:literal seconds) => {{
        $crate::t!(now) + $crate::t!($amount seconds)
    }};
    (in $amount:literal minutes) => {{
        $crate::t!(now) + $crate::t!($amount minutes)
    }};
}
