use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Result<Self, ModelError> {
        if page == 0 {
            return Err(ModelError::InvalidPage("page is 1-indexed".to_string()));
        }
        if per_page == 0 {
            return Err(ModelError::InvalidPage(
                "per_page must be positive".to_string(),
            ));
        }
        Ok(PageRequest { page, per_page })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            per_page: 25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_two_starts_at_item_eleven() {
        let page = PageRequest::new(2, 10).unwrap();
        assert_eq!(page.offset(), 10);
        assert_eq!(page.limit(), 10);
    }

    #[test]
    fn zero_page_is_rejected() {
        assert!(PageRequest::new(0, 10).is_err());
        assert!(PageRequest::new(1, 0).is_err());
    }
}
