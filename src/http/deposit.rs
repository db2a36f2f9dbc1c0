//! Deposit-address shell pages: an HTML listing and a QR code. Neither is
//! consumed by the worker; they exist for humans pointing a browser at the
//! monitor.

use std::io::Cursor;

use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;

use crate::state::AppState;

use super::HttpError;

pub async fn deposit_page(State(state): State<AppState>) -> Result<Html<String>, HttpError> {
    let counts = state.ledger.counts().await.map_err(HttpError::internal)?;

    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>bitbar monitor</title></head>\n<body>\n\
         <h1>bitbar deposit address</h1>\n\
         <p><code>{address}</code></p>\n\
         <p><img src=\"/qrcode\" alt=\"deposit address QR\" width=\"240\" height=\"240\"></p>\n\
         <p>{total} transactions observed, {pending} awaiting mint.</p>\n\
         </body>\n</html>\n",
        address = state.deposit_address,
        total = counts.total,
        pending = counts.pending,
    );

    Ok(Html(page))
}

pub async fn qrcode_png(State(state): State<AppState>) -> Result<Response, HttpError> {
    let code = QrCode::new(state.deposit_address.as_bytes()).map_err(HttpError::internal)?;
    let rendered = code
        .render::<Luma<u8>>()
        .min_dimensions(240, 240)
        .build();

    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(rendered)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(HttpError::internal)?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}
