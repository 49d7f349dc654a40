//! 페이지네이션
//!
//! 응답 형식은 `{count, next, previous, results}`이며 `next`/`previous`는 페이지 번호 또는 null입니다.

use serde::Serialize;

use crate::error::QueryError;

/// 페이지 요청
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1부터 시작하는 페이지 번호
    pub number: u64,
    /// 페이지 크기 (0이면 1로 취급)
    pub size: u64,
}

impl PageRequest {
    /// 새 페이지 요청
    pub fn new(number: u64, size: u64) -> Self {
        Self {
            number: number.max(1),
            size: size.max(1),
        }
    }

    /// 건너뛸 결과 수
    pub fn offset(&self) -> u64 {
        (self.number - 1).saturating_mul(self.size)
    }

    /// 전체 결과 수에 대한 마지막 페이지 번호 (빈 결과도 1페이지)
    pub fn last_page(&self, count: u64) -> u64 {
        count.div_ceil(self.size).max(1)
    }

    /// 요청한 페이지가 존재하는지 확인합니다.
    pub fn check(&self, count: u64) -> Result<(), QueryError> {
        if self.number > self.last_page(count) {
            return Err(QueryError::PageNotFound);
        }
        Ok(())
    }
}

/// 한 페이지의 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// 필터를 만족하는 전체 결과 수
    pub count: u64,
    /// 다음 페이지 번호
    pub next: Option<u64>,
    /// 이전 페이지 번호
    pub previous: Option<u64>,
    /// 이 페이지의 결과
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// 결과와 전체 수로 페이지를 만듭니다.
    pub fn new(request: PageRequest, count: u64, results: Vec<T>) -> Self {
        let last = request.last_page(count);
        Self {
            count,
            next: (request.number < last).then_some(request.number + 1),
            previous: (request.number > 1).then_some(request.number - 1),
            results,
        }
    }

    /// 이미 메모리에 있는 전체 결과를 잘라 페이지를 만듭니다.
    pub fn slice(request: PageRequest, all: Vec<T>) -> Result<Self, QueryError> {
        let count = all.len() as u64;
        request.check(count)?;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let size = usize::try_from(request.size).unwrap_or(usize::MAX);
        let results = all.into_iter().skip(offset).take(size).collect();
        Ok(Self::new(request, count, results))
    }

    /// 결과 타입을 변환합니다.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_and_last_page() {
        let request = PageRequest::new(3, 10);
        assert_eq!(request.offset(), 20);
        assert_eq!(request.last_page(0), 1);
        assert_eq!(request.last_page(10), 1);
        assert_eq!(request.last_page(11), 2);
    }

    #[test]
    fn first_page_of_empty_result_exists() {
        PageRequest::new(1, 50).check(0).unwrap();
        assert!(matches!(
            PageRequest::new(2, 50).check(0),
            Err(QueryError::PageNotFound)
        ));
    }

    #[test]
    fn links_point_to_neighbours() {
        let page = Page::new(PageRequest::new(2, 10), 25, vec![0u8; 10]);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));

        let last = Page::new(PageRequest::new(3, 10), 25, vec![0u8; 5]);
        assert_eq!(last.next, None);

        let only = Page::new(PageRequest::new(1, 10), 3, vec![0u8; 3]);
        assert_eq!((only.next, only.previous), (None, None));
    }

    #[test]
    fn slice_cuts_requested_window() {
        let page = Page::slice(PageRequest::new(2, 2), vec![1, 2, 3, 4, 5]).unwrap();
        assert_eq!(page.results, vec![3, 4]);
        assert_eq!(page.count, 5);
        assert!(Page::slice(PageRequest::new(4, 2), vec![1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn serializes_with_null_links() {
        let page = Page::new(PageRequest::new(1, 10), 1, vec!["a"]);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"count": 1, "next": null, "previous": null, "results": ["a"]})
        );
    }
}
