use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn to_utc(dt: BsonDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

pub fn to_bson(dt: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_millis() {
        let now = Utc::now();
        let back = to_utc(to_bson(now));
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }
}
