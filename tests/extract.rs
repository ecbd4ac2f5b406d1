use crmscraper::{
    config::Credentials,
    fetch::{self, Extractor, Query, SalesforceExtractor, Session},
    Error, Value,
};
use reqwest::Client;
use std::sync::{Arc, Mutex};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

struct Canned {
    status: u16,
    content_type: &'static str,
    body: String,
}

fn json(status: u16, body: &str) -> Canned {
    Canned {
        status,
        content_type: "application/json",
        body: body.to_string(),
    }
}

fn xml(status: u16, body: &str) -> Canned {
    Canned {
        status,
        content_type: "text/xml",
        body: body.to_string(),
    }
}

/// Answer successive connections with `responses`, in order, recording the
/// raw text of every request.
async fn serve(responses: Vec<Canned>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        for canned in responses {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut sock).await;
            log.lock().unwrap().push(request);
            let resp = format!(
                "HTTP/1.1 {} OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                canned.status,
                canned.content_type,
                canned.body.len(),
                canned.body
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    });

    (base, seen)
}

async fn read_request(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn client() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

fn extractor(base: &str) -> SalesforceExtractor {
    let session = Session::from_parts(
        client(),
        Url::parse(&format!("{}/", base)).unwrap(),
        "SID123",
        "59.0",
    );
    SalesforceExtractor::new(session)
}

const PAGE_1: &str = r#"{"totalSize":3,"done":false,"nextRecordsUrl":"/services/data/v59.0/query/01gD0000002HU6KIAW-2000","records":[
  {"attributes":{"type":"Contact","url":"/services/data/v59.0/sobjects/Contact/003A"},"Id":"003A","Name":"Ann","MobilePhone":null,"Email":" Ann@X.com"},
  {"attributes":{"type":"Contact","url":"/services/data/v59.0/sobjects/Contact/003B"},"Id":"003B","Name":"Ben","MobilePhone":"0400","Email":null}]}"#;

const PAGE_2: &str = r#"{"totalSize":3,"done":true,"records":[
  {"attributes":{"type":"Contact","url":"/services/data/v59.0/sobjects/Contact/003C"},"Id":"003C","Name":"Cat","MobilePhone":null,"Email":"cat@x.com"}]}"#;

#[tokio::test]
async fn follows_pages_until_done() {
    let (base, seen) = serve(vec![json(200, PAGE_1), json(200, PAGE_2)]).await;
    let ex = extractor(&base);

    let table = ex.fetch(&fetch::contacts_query()).await.unwrap();

    assert_eq!(table.columns, vec!["Id", "Name", "MobilePhone", "Email"]);
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(0, "Email"), Some(&Value::from(" Ann@X.com")));
    assert_eq!(table.get(1, "Email"), Some(&Value::Null));
    assert_eq!(table.get(2, "Id"), Some(&Value::from("003C")));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("GET /services/data/v59.0/query/?q=SELECT+Id%2C+Name%2C+MobilePhone%2C+Email+FROM+Contact "));
    assert!(seen[0].to_lowercase().contains("authorization: bearer sid123"));
    assert!(seen[1].starts_with("GET /services/data/v59.0/query/01gD0000002HU6KIAW-2000 "));
}

#[tokio::test]
async fn failed_second_page_fails_the_whole_fetch() {
    let (base, _) = serve(vec![
        json(200, PAGE_1),
        json(503, r#"[{"message":"Server busy","errorCode":"SERVER_UNAVAILABLE"}]"#),
    ])
    .await;

    let err = extractor(&base)
        .fetch(&fetch::contacts_query())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(msg) if msg.contains("SERVER_UNAVAILABLE")));
}

#[tokio::test]
async fn unfinished_page_without_next_url_is_source_unavailable() {
    let (base, seen) = serve(vec![json(
        200,
        r#"{"totalSize":5,"done":false,"records":[{"attributes":{"type":"Lead"},"Id":"00Q1"}]}"#,
    )])
    .await;

    let err = extractor(&base)
        .fetch(&fetch::leads_query())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(msg) if msg.contains("nextRecordsUrl")));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_field_is_query_syntax() {
    let (base, _) = serve(vec![json(
        400,
        r#"[{"message":"No such column 'Shoe__c' on entity 'Lead'.","errorCode":"INVALID_FIELD"}]"#,
    )])
    .await;

    let err = extractor(&base)
        .fetch(&Query::new("Lead", &["Id", "Shoe__c"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QuerySyntax(msg) if msg.contains("Shoe__c")));
}

#[tokio::test]
async fn rejected_session_is_source_unavailable() {
    let (base, _) = serve(vec![json(
        401,
        r#"[{"message":"Session expired or invalid","errorCode":"INVALID_SESSION_ID"}]"#,
    )])
    .await;

    let err = extractor(&base)
        .fetch(&fetch::leads_query())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(_)));
}

#[tokio::test]
async fn unreachable_host_is_source_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = extractor(&base)
        .fetch(&fetch::leads_query())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(_)));
}

fn creds() -> Credentials {
    Credentials {
        username: "ops@example.com".into(),
        password: "pw".into(),
        security_token: "TOKEN".into(),
    }
}

#[tokio::test]
async fn login_then_revoke() {
    let (base, seen) = serve_login(
        "<soapenv:Envelope><soapenv:Body><loginResponse><result>\
         <serverUrl>{BASE}/services/Soap/u/59.0/00D000000000001</serverUrl>\
         <sessionId>00D!SESSION</sessionId></result></loginResponse></soapenv:Body></soapenv:Envelope>",
    )
    .await;

    let session = Session::login(&client(), &base, "59.0", &creds()).await.unwrap();
    assert_eq!(session.instance_url().as_str(), format!("{}/", base));
    session.close().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("POST /services/Soap/u/59.0 "));
    assert!(seen[0].to_lowercase().contains("soapaction: login"));
    assert!(seen[0].contains("<n1:username>ops@example.com</n1:username>"));
    assert!(seen[0].contains("<n1:password>pwTOKEN</n1:password>"));
    assert!(seen[1].starts_with("POST /services/oauth2/revoke "));
    assert!(seen[1].ends_with("token=00D%21SESSION"));
}

/// Like [`serve`], but the login body can refer to the server's own address
/// through a `{BASE}` placeholder; the revoke call gets an empty 200.
async fn serve_login(template: &str) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let body = template.replace("{BASE}", &base);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        for canned in [xml(200, &body), json(200, "")] {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut sock).await;
            log.lock().unwrap().push(request);
            let resp = format!(
                "HTTP/1.1 {} OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                canned.status,
                canned.content_type,
                canned.body.len(),
                canned.body
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    });

    (base, seen)
}

#[tokio::test]
async fn login_fault_is_source_unavailable() {
    let (base, _) = serve(vec![xml(
        500,
        "<soapenv:Envelope><soapenv:Body><soapenv:Fault><faultcode>sf:INVALID_LOGIN</faultcode>\
         <faultstring>INVALID_LOGIN: Invalid username, password, security token; or user locked out.</faultstring>\
         </soapenv:Fault></soapenv:Body></soapenv:Envelope>",
    )])
    .await;

    let err = Session::login(&client(), &base, "59.0", &creds())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(msg) if msg.contains("INVALID_LOGIN")));
}
