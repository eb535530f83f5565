use scraper::{ElementRef, Html, Selector};

use crate::{
    declare::{PriceQuote, SummaryTable},
    error::{QuoteError, Result},
    util::text,
};

/// 報價標頭下的區塊，最後一個 div 內含成交價與漲跌
const HEADER_BLOCK: &str = "#quote-header-info > div";
const PRICE_SPAN: &str = "span";
/// 摘要表的每一列
const SUMMARY_ROW: &str = "#quote-summary tr";

/// 漲跌文字中要移除的字元，例如 "+1.50 (+1.01%)"
const CHANGE_ESCAPE_CHAR: [char; 3] = ['(', ')', '%'];

/// Parses one quote page and extracts the price block and the summary table.
///
/// Runs on a parse worker; the document never leaves this call.
pub fn extract(html: &str) -> Result<(PriceQuote, SummaryTable)> {
    let document = Html::parse_document(html);
    let last_price = extract_price(&document)?;
    let last_summary = extract_summary(&document)?;

    Ok((last_price, last_summary))
}

/// 取出最新成交價與漲跌
///
/// 標頭最後一個 div 中的前兩個 span 依序為成交價與 `<漲跌> (<漲跌幅>%)`。
pub fn extract_price(document: &Html) -> Result<PriceQuote> {
    let header = selector(HEADER_BLOCK)?;
    let block = document
        .select(&header)
        .last()
        .ok_or_else(|| QuoteError::Structure(format!("no element matches '{}'", HEADER_BLOCK)))?;

    let span = selector(PRICE_SPAN)?;
    let mut spans = block.select(&span).map(|e| e.text().collect::<String>());
    let (price, change) = match (spans.next(), spans.next()) {
        (Some(price), Some(change)) => (price, change),
        (found, _) => {
            return Err(QuoteError::Structure(format!(
                "expected 2 spans under the last '{}', found {}",
                HEADER_BLOCK,
                usize::from(found.is_some())
            )))
        }
    };

    let price_value = text::parse_grouped_f64(&price)?;
    if price_value < 0.0 {
        return Err(QuoteError::parse(&price, "price must not be negative"));
    }

    let (change_absolute, change_percent) = parse_change(&change)?;

    Ok(PriceQuote {
        price: price_value,
        change_absolute,
        change_percent,
    })
}

/// 解析 "<漲跌> (<漲跌幅>%)"，去掉括號與百分比符號後須剛好兩個數字，不處理千分位
fn parse_change(s: &str) -> Result<(f64, f64)> {
    let cleaned = s.replace(CHANGE_ESCAPE_CHAR, "");
    let tokens = cleaned.split_whitespace().collect::<Vec<_>>();

    match tokens.as_slice() {
        [absolute, percent] => Ok((
            text::parse_f64(absolute)?,
            text::parse_f64(percent)?,
        )),
        _ => Err(QuoteError::parse(
            s,
            format!("expected '<change> (<percent>%)', found {} tokens", tokens.len()),
        )),
    }
}

/// 取出摘要表
///
/// 只收剛好兩個儲存格的列，其他列（分隔列、標題列）略過；重複的欄位以最後一筆為準。
pub fn extract_summary(document: &Html) -> Result<SummaryTable> {
    let rows = selector(SUMMARY_ROW)?;
    let mut summary = SummaryTable::new();

    for row in document.select(&rows) {
        let cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .collect::<Vec<_>>();

        if let [label, value] = cells.as_slice() {
            summary.insert(cell_text(label), cell_text(value));
        }
    }

    Ok(summary)
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|why| QuoteError::Structure(format!("invalid selector '{}': {:?}", css, why)))
}
