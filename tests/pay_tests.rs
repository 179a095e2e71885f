//! Merchant payment calls: signed XML requests and XML envelope handling.

use chrono::NaiveDate;
use wechat_mp_client::api::{sign_md5, BillType, PayPackage, RefundStatus, TradeType};
use wechat_mp_client::config::keys;
use wechat_mp_client::types::{AppId, AppSecret};
use wechat_mp_client::{ErrorKind, WechatMp};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const MCH_ID: &str = "1900000109";
const PAY_KEY: &str = "192006250b4c09247ec02edce69f6a2d";

fn create_wechat(base_url: &str) -> WechatMp {
    WechatMp::builder()
        .appid(AppId::new("wx1234567890abcdef").unwrap())
        .secret(AppSecret::new("secret1234567890ab").unwrap())
        .base_url(base_url)
        .url(keys::PAY_UNIFIED_ORDER, "/pay/unifiedorder")
        .url(keys::PAY_REFUND_QUERY, "/pay/refundquery")
        .url(keys::PAY_DOWNLOAD_BILL, "/pay/downloadbill")
        .pay(MCH_ID, PAY_KEY)
        .build()
        .unwrap()
}

fn package() -> PayPackage {
    PayPackage::builder()
        .body("Coffee")
        .out_trade_no("T20240101001")
        .total_fee(12.5)
        .spbill_create_ip("127.0.0.1")
        .notify_url("https://example.com/notify")
        .build()
        .unwrap()
}

fn xml(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(format!("<xml>{body}</xml>"), "text/xml")
}

/// Pull `<name>` values out of a flat request document.
fn request_fields(request: &Request) -> Vec<(String, String)> {
    let body = String::from_utf8_lossy(&request.body).into_owned();
    let mut fields = Vec::new();
    let mut rest = body
        .trim()
        .trim_start_matches("<xml>")
        .trim_end_matches("</xml>");
    while let Some(open) = rest.find('<') {
        let close = rest[open..].find('>').unwrap() + open;
        let name = rest[open + 1..close].to_string();
        let end_tag = format!("</{name}>");
        let end = rest.find(&end_tag).unwrap();
        let value = rest[close + 1..end]
            .trim_start_matches("<![CDATA[")
            .trim_end_matches("]]>")
            .to_string();
        fields.push((name, value));
        rest = &rest[end + end_tag.len()..];
    }
    fields
}

#[tokio::test]
async fn test_unified_order_sends_signed_document() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pay/unifiedorder"))
        .and(header("content-type", "text/xml; charset=utf-8"))
        .and(body_string_contains("<total_fee><![CDATA[1250]]></total_fee>"))
        .and(body_string_contains("<trade_type><![CDATA[JSAPI]]></trade_type>"))
        .and(body_string_contains(MCH_ID))
        .respond_with(xml(
            "<return_code><![CDATA[SUCCESS]]></return_code>\
             <result_code><![CDATA[SUCCESS]]></result_code>\
             <trade_type><![CDATA[JSAPI]]></trade_type>\
             <prepay_id><![CDATA[wx201410272009395522657a690389285100]]></prepay_id>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = create_wechat(&server.uri());
    let prepay = wechat
        .unified_order(&package(), TradeType::Jsapi, Some("oUpF8uMuAJO_M2pxb1Q9zNjWeS6o"))
        .await
        .unwrap();

    assert_eq!(prepay.prepay_id, "wx201410272009395522657a690389285100");
    assert_eq!(prepay.code_url, None);

    let requests = server.received_requests().await.unwrap();
    let fields = request_fields(&requests[0]);
    let sign = fields
        .iter()
        .find(|(name, _)| name == "sign")
        .map(|(_, value)| value.clone())
        .unwrap();
    let expected = sign_md5(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())), PAY_KEY);
    assert_eq!(sign, expected);
    assert!(fields.iter().any(|(k, v)| k == "openid" && v == "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o"));
}

#[tokio::test]
async fn test_native_order_returns_code_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pay/unifiedorder"))
        .respond_with(xml(
            "<return_code>SUCCESS</return_code>\
             <result_code>SUCCESS</result_code>\
             <trade_type>NATIVE</trade_type>\
             <prepay_id>PREPAY1</prepay_id>\
             <code_url>weixin://wxpay/bizpayurl?pr=abc</code_url>",
        ))
        .mount(&server)
        .await;

    let wechat = create_wechat(&server.uri());
    let prepay = wechat
        .unified_order(&package(), TradeType::Native, None)
        .await
        .unwrap();

    assert_eq!(prepay.trade_type, "NATIVE");
    assert_eq!(prepay.code_url.as_deref(), Some("weixin://wxpay/bizpayurl?pr=abc"));
}

#[tokio::test]
async fn test_jsapi_order_requires_openid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let wechat = create_wechat(&server.uri());
    let err = wechat
        .unified_order(&package(), TradeType::Jsapi, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LocalValidation);
}

#[tokio::test]
async fn test_business_failure_is_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pay/unifiedorder"))
        .respond_with(xml(
            "<return_code>SUCCESS</return_code>\
             <result_code>FAIL</result_code>\
             <err_code>ORDERPAID</err_code>\
             <err_code_des>order already paid</err_code_des>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = create_wechat(&server.uri());
    let err = wechat
        .unified_order(&package(), TradeType::Native, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    assert_eq!(err.message(), "ORDERPAID: order already paid");
}

#[tokio::test]
async fn test_query_refund_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pay/refundquery"))
        .and(body_string_contains("T20240101001"))
        .respond_with(xml(
            "<return_code>SUCCESS</return_code>\
             <result_code>SUCCESS</result_code>\
             <refund_count>1</refund_count>\
             <refund_status_0>PROCESSING</refund_status_0>",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = create_wechat(&server.uri());
    let status = wechat.query_refund("T20240101001").await.unwrap();

    assert_eq!(status, RefundStatus::Processing);
}

#[tokio::test]
async fn test_download_bill_text() {
    let server = MockServer::start().await;
    let statement = "交易时间,公众账号ID\n`2024-01-01 10:00:00,`wx1234567890abcdef\n";

    Mock::given(method("POST"))
        .and(path("/pay/downloadbill"))
        .and(body_string_contains("<bill_date><![CDATA[20240101]]></bill_date>"))
        .and(body_string_contains("<bill_type><![CDATA[SUCCESS]]></bill_type>"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(statement, "text/plain"))
        .expect(1)
        .mount(&server)
        .await;

    let wechat = create_wechat(&server.uri());
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    assert_eq!(wechat.download_bill(date, BillType::Success).await.unwrap(), statement);
}

#[tokio::test]
async fn test_download_bill_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pay/downloadbill"))
        .respond_with(xml(
            "<return_code><![CDATA[FAIL]]></return_code>\
             <return_msg><![CDATA[No Bill Exist]]></return_msg>",
        ))
        .mount(&server)
        .await;

    let wechat = create_wechat(&server.uri());
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let err = wechat.download_bill(date, BillType::All).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    assert_eq!(err.message(), "No Bill Exist");
}

#[test]
fn test_jsapi_pay_request_is_signed() {
    let wechat = create_wechat("http://127.0.0.1:1");
    let request = wechat.jsapi_pay_request("PREPAY1").unwrap();

    assert_eq!(request.package, "prepay_id=PREPAY1");
    assert_eq!(request.sign_type, "MD5");
    let expected = sign_md5(
        [
            ("appId", request.app_id.as_str()),
            ("timeStamp", request.time_stamp.as_str()),
            ("nonceStr", request.nonce_str.as_str()),
            ("package", request.package.as_str()),
            ("signType", "MD5"),
        ],
        PAY_KEY,
    );
    assert_eq!(request.pay_sign, expected);
}

#[test]
fn test_pay_without_merchant_config() {
    let wechat = WechatMp::builder()
        .appid(AppId::new("wx1234567890abcdef").unwrap())
        .secret(AppSecret::new("secret1234567890ab").unwrap())
        .build()
        .unwrap();

    let err = wechat.jsapi_pay_request("PREPAY1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LocalValidation);
}
